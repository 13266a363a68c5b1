//! Game message definitions
//! These are the wire types the simulation sends to clients

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::game::ClientId;
use crate::net::packer::Packer;

pub const MSG_SV_BROADCAST: i32 = 2;
pub const MSG_SV_CHAT: i32 = 3;
pub const MSG_SV_KILLMSG: i32 = 4;
pub const MSG_SV_EXTRAPROJECTILE: i32 = 7;

/// Ints per projectile record
pub const PROJECTILE_FIELDS: usize = 6;

/// Chat team value for messages from the server to everyone
pub const CHAT_ALL: i32 = -2;

/// Public network fields of a projectile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectileRecord {
    pub x: i32,
    pub y: i32,
    /// Direction scaled by 100
    pub vel_x: i32,
    pub vel_y: i32,
    pub kind: i32,
    pub start_tick: i32,
}

impl ProjectileRecord {
    pub fn fields(&self) -> [i32; PROJECTILE_FIELDS] {
        [
            self.x,
            self.y,
            self.vel_x,
            self.vel_y,
            self.kind,
            self.start_tick,
        ]
    }
}

/// Messages sent from server to clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Someone died
    KillMsg {
        killer: i32,
        victim: i32,
        weapon: i32,
        mode_special: i32,
    },

    /// Prediction copy of projectiles a client just fired
    ExtraProjectile { projectiles: Vec<ProjectileRecord> },

    /// Centre-screen text
    Broadcast { text: String },

    Chat {
        team: i32,
        /// -1 for server messages
        client_id: i32,
        text: String,
    },
}

impl ServerMsg {
    pub fn msg_id(&self) -> i32 {
        match self {
            ServerMsg::KillMsg { .. } => MSG_SV_KILLMSG,
            ServerMsg::ExtraProjectile { .. } => MSG_SV_EXTRAPROJECTILE,
            ServerMsg::Broadcast { .. } => MSG_SV_BROADCAST,
            ServerMsg::Chat { .. } => MSG_SV_CHAT,
        }
    }

    /// Kill messages must arrive; the rest may be dropped
    pub fn is_vital(&self) -> bool {
        !matches!(self, ServerMsg::ExtraProjectile { .. })
    }

    /// Pack as `id << 1` followed by the fields
    pub fn pack(&self) -> Bytes {
        let mut p = Packer::new();
        p.add_int(self.msg_id() << 1);
        match self {
            ServerMsg::KillMsg {
                killer,
                victim,
                weapon,
                mode_special,
            } => {
                p.add_int(*killer)
                    .add_int(*victim)
                    .add_int(*weapon)
                    .add_int(*mode_special);
            }
            ServerMsg::ExtraProjectile { projectiles } => {
                p.add_int(projectiles.len() as i32);
                for record in projectiles {
                    for field in record.fields() {
                        p.add_int(field);
                    }
                }
            }
            ServerMsg::Broadcast { text } => {
                p.add_string(text);
            }
            ServerMsg::Chat {
                team,
                client_id,
                text,
            } => {
                p.add_int(*team).add_int(*client_id).add_string(text);
            }
        }
        p.finish()
    }
}

/// Who gets a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    One(ClientId),
    All { except: Option<ClientId> },
}

impl Recipient {
    pub fn includes(&self, client_id: ClientId) -> bool {
        match *self {
            Recipient::One(id) => id == client_id,
            Recipient::All { except } => except != Some(client_id),
        }
    }
}

/// A message queued during a tick, delivered after it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub msg: ServerMsg,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::packer::Unpacker;

    #[test]
    fn kill_msg_packing() {
        let msg = ServerMsg::KillMsg {
            killer: 1,
            victim: 2,
            weapon: -1,
            mode_special: 0,
        };
        let bytes = msg.pack();
        let mut u = Unpacker::new(&bytes);
        assert_eq!(u.get_int(), Ok(MSG_SV_KILLMSG << 1));
        assert_eq!(u.get_int(), Ok(1));
        assert_eq!(u.get_int(), Ok(2));
        assert_eq!(u.get_int(), Ok(-1));
        assert_eq!(u.get_int(), Ok(0));
        assert_eq!(u.remaining(), 0);
        assert!(msg.is_vital());
    }

    #[test]
    fn extra_projectile_lists_every_field() {
        let record = ProjectileRecord {
            x: 10,
            y: 20,
            vel_x: 100,
            vel_y: 0,
            kind: 1,
            start_tick: 50,
        };
        let msg = ServerMsg::ExtraProjectile {
            projectiles: vec![record, record],
        };
        let bytes = msg.pack();
        let mut u = Unpacker::new(&bytes);
        assert_eq!(u.get_int(), Ok(MSG_SV_EXTRAPROJECTILE << 1));
        assert_eq!(u.get_int(), Ok(2));
        for _ in 0..2 {
            for field in record.fields() {
                assert_eq!(u.get_int(), Ok(field));
            }
        }
        assert_eq!(u.remaining(), 0);
    }

    #[test]
    fn recipients() {
        assert!(Recipient::All { except: Some(2) }.includes(1));
        assert!(!Recipient::All { except: Some(2) }.includes(2));
        assert!(Recipient::One(4).includes(4));
        assert!(!Recipient::One(4).includes(3));
    }
}
