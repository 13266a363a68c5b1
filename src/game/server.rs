//! Authoritative tick loop around a `GameWorld`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::events::WorldEvent;
use crate::game::input::PlayerInput;
use crate::game::player::Team;
use crate::game::snapshot::SnapshotBuilder;
use crate::game::world::GameWorld;
use crate::game::ClientId;
use crate::net::protocol::{Recipient, ServerMsg};
use crate::util::time::{Tick, Timer};

/// Commands from the network layer
#[derive(Debug, Clone)]
pub enum ServerCmd {
    Join {
        client_id: ClientId,
        name: String,
        custom_client: bool,
    },
    Leave {
        client_id: ClientId,
    },
    Input {
        client_id: ClientId,
        input: PlayerInput,
    },
    SetTeam {
        client_id: ClientId,
        team: Team,
    },
    Spectate {
        client_id: ClientId,
        target: Option<ClientId>,
    },
    /// Paused worlds send live cores instead of reckoning snapshots
    Pause {
        paused: bool,
    },
}

/// Everything the server hands back to the network layer
#[derive(Debug, Clone)]
pub enum Outbound {
    Message {
        recipient: Recipient,
        vital: bool,
        packed: Bytes,
        msg: ServerMsg,
    },
    Snapshot {
        client_id: ClientId,
        tick: Tick,
        /// Tick of the previous snapshot, `None` for the first one
        previous_tick: Option<Tick>,
        /// Character records in the observer's layout, keyed by the id the
        /// observer knows the character under
        items: Vec<(i32, Bytes)>,
        /// Events since the previous snapshot the observer may see
        events: Vec<WorldEvent>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("game server stopped")]
    Stopped,
}

/// Handle to a running server
#[derive(Clone)]
pub struct ServerHandle {
    pub cmd_tx: mpsc::Sender<ServerCmd>,
    pub outbound_tx: broadcast::Sender<Outbound>,
    pub player_count: Arc<AtomicUsize>,
}

impl ServerHandle {
    pub fn player_count(&self) -> usize {
        self.player_count.load(Ordering::Relaxed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.outbound_tx.subscribe()
    }

    pub async fn send(&self, cmd: ServerCmd) -> Result<(), ServerError> {
        self.cmd_tx.send(cmd).await.map_err(|_| ServerError::Stopped)
    }
}

pub struct GameServer {
    world: GameWorld,
    cmd_rx: mpsc::Receiver<ServerCmd>,
    outbound_tx: broadcast::Sender<Outbound>,
    snapshot_builder: SnapshotBuilder,
    /// Events collected since the last snapshot
    pending_events: Vec<WorldEvent>,
    player_count: Arc<AtomicUsize>,
}

impl GameServer {
    /// `snapshot_rate` is in snapshots per second
    pub fn new(world: GameWorld, snapshot_rate: u32) -> (Self, ServerHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (outbound_tx, _) = broadcast::channel(256);
        let player_count = Arc::new(AtomicUsize::new(0));

        let handle = ServerHandle {
            cmd_tx,
            outbound_tx: outbound_tx.clone(),
            player_count: player_count.clone(),
        };

        let tick_speed = u32::try_from(world.time.tick_speed).unwrap_or(u32::MAX);
        let snapshot_interval = tick_speed / snapshot_rate.max(1);
        let server = Self {
            world,
            cmd_rx,
            outbound_tx,
            snapshot_builder: SnapshotBuilder::new(snapshot_interval),
            pending_events: Vec::new(),
            player_count,
        };

        (server, handle)
    }

    pub fn world(&self) -> &GameWorld {
        &self.world
    }

    /// Run the tick loop until every handle is dropped
    pub async fn run(mut self) {
        info!(world_id = %self.world.id, tick_speed = self.world.time.tick_speed, "game server started");

        let tick_duration = Duration::from_micros(1_000_000 / self.world.time.tick_speed as u64);
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tick_interval.tick().await;

            if !self.step() {
                break;
            }
        }

        info!(world_id = %self.world.id, tick = self.world.time.tick, "game server stopped");
    }

    /// One full server tick: commands, simulation, outbound. Returns false once the
    /// command channel is closed.
    pub fn step(&mut self) -> bool {
        let open = self.process_commands();

        let timer = Timer::new();
        self.world.tick();
        let elapsed = timer.elapsed_micros();
        if elapsed > 1_000_000 / self.world.time.tick_speed as u64 {
            warn!(tick = self.world.time.tick, elapsed_us = elapsed, "tick overran its budget");
        }

        self.flush_messages();
        self.pending_events.extend(self.world.drain_events());

        if self.snapshot_builder.should_send() {
            self.send_snapshots();
        }

        open
    }

    fn process_commands(&mut self) -> bool {
        loop {
            match self.cmd_rx.try_recv() {
                Ok(cmd) => self.handle_command(cmd),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn handle_command(&mut self, cmd: ServerCmd) {
        match cmd {
            ServerCmd::Join {
                client_id,
                name,
                custom_client,
            } => {
                if !self.world.add_player(client_id, &name, custom_client) {
                    warn!(client_id, "join rejected, slot taken or out of range");
                    return;
                }
                self.snapshot_builder.force_next();
            }
            ServerCmd::Leave { client_id } => {
                if !self.world.remove_player(client_id) {
                    debug!(client_id, "leave for unknown client");
                }
            }
            ServerCmd::Input { client_id, input } => {
                self.world.apply_input(client_id, &input);
            }
            ServerCmd::SetTeam { client_id, team } => {
                self.world.set_team(client_id, team);
            }
            ServerCmd::Spectate { client_id, target } => {
                self.world.set_spectator_target(client_id, target);
            }
            ServerCmd::Pause { paused } => {
                self.world.set_paused(paused);
            }
        }

        self.player_count
            .store(self.world.player_count(), Ordering::Relaxed);
    }

    fn flush_messages(&mut self) {
        for out in self.world.drain_outbox() {
            let _ = self.outbound_tx.send(Outbound::Message {
                recipient: out.recipient,
                vital: out.msg.is_vital(),
                packed: out.msg.pack(),
                msg: out.msg,
            });
        }
    }

    fn send_snapshots(&mut self) {
        let tick = self.world.time.tick;
        let previous_tick = self.snapshot_builder.last_snapshot_tick();
        let events = std::mem::take(&mut self.pending_events);

        let observers: Vec<ClientId> = self
            .world
            .players
            .iter()
            .flatten()
            .map(|player| player.client_id)
            .collect();

        for client_id in observers {
            let items = self
                .world
                .snap_for(Some(client_id))
                .iter()
                .map(|item| (item.id, item.encode()))
                .collect();
            let visible = events
                .iter()
                .filter(|event| event.visible_to(client_id))
                .cloned()
                .collect();

            let _ = self.outbound_tx.send(Outbound::Snapshot {
                client_id,
                tick,
                previous_tick,
                items,
                events: visible,
            });
        }

        self.snapshot_builder.mark_sent(tick);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GameConfig, MAX_CLIENTS};
    use crate::game::collision::{Collision, DEFAULT_ARENA};
    use crate::game::snapshot::Layout;

    fn server() -> (GameServer, ServerHandle) {
        let collision = Collision::from_ascii(DEFAULT_ARENA).unwrap();
        let world = GameWorld::new(
            Arc::new(GameConfig::default()),
            Arc::new(collision),
            50,
            1,
            MAX_CLIENTS,
        );
        GameServer::new(world, 25)
    }

    #[test]
    fn join_is_processed_on_step() {
        let (mut server, handle) = server();
        handle
            .cmd_tx
            .try_send(ServerCmd::Join {
                client_id: 3,
                name: "alice".to_string(),
                custom_client: true,
            })
            .unwrap();

        assert!(server.step());
        assert_eq!(handle.player_count(), 1);
        assert!(server.world().character(3).is_some());
    }

    #[test]
    fn snapshots_go_to_every_player() {
        let (mut server, handle) = server();
        let mut rx = handle.subscribe();
        for (id, custom) in [(0, true), (1, false)] {
            handle
                .cmd_tx
                .try_send(ServerCmd::Join {
                    client_id: id,
                    name: format!("p{id}"),
                    custom_client: custom,
                })
                .unwrap();
        }
        server.step();

        let mut seen = Vec::new();
        while let Ok(out) = rx.try_recv() {
            if let Outbound::Snapshot { client_id, items, .. } = out {
                seen.push((client_id, items.len()));
            }
        }
        seen.sort();
        assert_eq!(seen, vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn legacy_observer_receives_its_own_record_as_id_zero() {
        let (mut server, handle) = server();
        let mut rx = handle.subscribe();
        for (id, custom) in [(0, true), (7, false)] {
            handle
                .cmd_tx
                .try_send(ServerCmd::Join {
                    client_id: id,
                    name: format!("p{id}"),
                    custom_client: custom,
                })
                .unwrap();
        }
        server.step();

        let mut legacy_items = None;
        let mut extended_ids = None;
        while let Ok(out) = rx.try_recv() {
            if let Outbound::Snapshot { client_id, items, .. } = out {
                match client_id {
                    7 => legacy_items = Some(items),
                    0 => extended_ids = Some(items.iter().map(|(id, _)| *id).collect::<Vec<_>>()),
                    _ => {}
                }
            }
        }

        let mut extended_ids = extended_ids.unwrap();
        extended_ids.sort();
        assert_eq!(extended_ids, vec![0, 7]);

        let legacy_items = legacy_items.unwrap();
        let mut ids: Vec<i32> = legacy_items.iter().map(|(id, _)| *id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1]);

        // health sits at field 16 of the legacy record and is only visible to its owner
        let health = |record: &Bytes| i32::from_le_bytes(record[64..68].try_into().unwrap());
        for (id, record) in &legacy_items {
            assert_eq!(record.len(), Layout::Legacy.size());
            let expected = if *id == 0 { 10 } else { 0 };
            assert_eq!(health(record), expected);
        }
    }

    #[test]
    fn pause_reaches_the_world_and_snapshots_chain_ticks() {
        let (mut server, handle) = server();
        let mut rx = handle.subscribe();
        handle
            .cmd_tx
            .try_send(ServerCmd::Join {
                client_id: 0,
                name: "alice".to_string(),
                custom_client: true,
            })
            .unwrap();
        handle
            .cmd_tx
            .try_send(ServerCmd::Pause { paused: true })
            .unwrap();

        for _ in 0..4 {
            server.step();
        }
        assert!(server.world().paused);

        let mut chain = Vec::new();
        while let Ok(out) = rx.try_recv() {
            if let Outbound::Snapshot {
                tick,
                previous_tick,
                items,
                ..
            } = out
            {
                // paused worlds send the live core with tick 0
                for (_, record) in &items {
                    assert_eq!(&record[4..8], &0i32.to_le_bytes());
                }
                chain.push((previous_tick, tick));
            }
        }

        assert!(chain.len() >= 2);
        assert_eq!(chain[0].0, None);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].0, Some(pair[0].1));
        }
    }

    #[test]
    fn step_reports_closed_channel() {
        let (mut server, handle) = server();
        drop(handle);
        assert!(!server.step());
    }
}
