//! Tile grid collision: point/box tests, box movement and line tracing

use glam::Vec2;

pub const TILE_SIZE: f32 = 32.0;

/// Number of colour-freeze tiles (`0`..`8` in ASCII maps)
pub const NUM_COLOR_FREEZE: u8 = 9;

/// How far outside the map (in tiles) a position still counts as inside the game layer
const GAME_LAYER_MARGIN: i32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tile {
    #[default]
    Air,
    Solid,
    /// Solid, but the hook slides off
    NoHook,
    Death,
    Freeze,
    Unfreeze,
    /// Freeze tile that also recolours the player
    ColorFreeze(u8),
    RaceBegin,
    RaceEnd,
}

impl Tile {
    pub fn is_solid(self) -> bool {
        matches!(self, Tile::Solid | Tile::NoHook)
    }

    pub fn is_freeze(self) -> bool {
        matches!(self, Tile::Freeze | Tile::ColorFreeze(_))
    }

    fn from_ascii(ch: char) -> Option<Self> {
        let tile = match ch {
            '.' | ' ' => Tile::Air,
            '#' => Tile::Solid,
            'N' => Tile::NoHook,
            'X' => Tile::Death,
            'F' => Tile::Freeze,
            'U' => Tile::Unfreeze,
            'B' => Tile::RaceBegin,
            'E' => Tile::RaceEnd,
            '0'..='8' => Tile::ColorFreeze(ch as u8 - b'0'),
            _ => return None,
        };
        Some(tile)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MapError {
    #[error("map has no rows")]
    Empty,

    #[error("row {row} has {found} tiles, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("unknown tile {ch:?} at row {row}, column {column}")]
    UnknownTile { ch: char, row: usize, column: usize },
}

/// Result of tracing a line against solid tiles
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    /// First point inside a solid tile
    pub pos: Vec2,
    /// Last free point before the hit
    pub before: Vec2,
    pub tile: Tile,
}

#[derive(Debug, Clone)]
pub struct Collision {
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
}

impl Collision {
    /// Build a map from rows of ASCII tiles, top row first
    pub fn from_ascii(src: &str) -> Result<Self, MapError> {
        let rows: Vec<&str> = src
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect();
        let Some(first) = rows.first() else {
            return Err(MapError::Empty);
        };

        let width = first.chars().count();
        let mut tiles = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            let found = line.chars().count();
            if found != width {
                return Err(MapError::Ragged {
                    row,
                    expected: width,
                    found,
                });
            }
            for (column, ch) in line.chars().enumerate() {
                let tile = Tile::from_ascii(ch).ok_or(MapError::UnknownTile { ch, row, column })?;
                tiles.push(tile);
            }
        }

        Ok(Self {
            width,
            height: rows.len(),
            tiles,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Tile under a world position; positions outside the grid clamp to the border
    pub fn tile_at(&self, pos: Vec2) -> Tile {
        let nx = ((pos.x.round() as i32) / TILE_SIZE as i32).clamp(0, self.width as i32 - 1);
        let ny = ((pos.y.round() as i32) / TILE_SIZE as i32).clamp(0, self.height as i32 - 1);
        self.tiles[ny as usize * self.width + nx as usize]
    }

    pub fn check_point(&self, pos: Vec2) -> bool {
        self.tile_at(pos).is_solid()
    }

    /// True if any corner of the box around `pos` is solid
    pub fn test_box(&self, pos: Vec2, size: Vec2) -> bool {
        let half = size * 0.5;
        self.check_point(Vec2::new(pos.x - half.x, pos.y - half.y))
            || self.check_point(Vec2::new(pos.x + half.x, pos.y - half.y))
            || self.check_point(Vec2::new(pos.x - half.x, pos.y + half.y))
            || self.check_point(Vec2::new(pos.x + half.x, pos.y + half.y))
    }

    /// Step from `from` to `to` one unit at a time and report the first solid point
    pub fn intersect_line(&self, from: Vec2, to: Vec2) -> Option<LineHit> {
        let end = from.distance(to) + 1.0;
        let steps = end as i32;
        let mut last = from;

        for i in 0..=steps {
            let pos = from.lerp(to, i as f32 / end);
            let tile = self.tile_at(pos);
            if tile.is_solid() {
                return Some(LineHit {
                    pos,
                    before: last,
                    tile,
                });
            }
            last = pos;
        }

        None
    }

    /// Move a box by `vel`, sliding along walls. Blocked axes get `-elasticity` applied.
    pub fn move_box(&self, pos: &mut Vec2, vel: &mut Vec2, size: Vec2, elasticity: f32) {
        let distance = vel.length();
        if distance <= 0.00001 {
            return;
        }

        let max = distance as i32;
        let fraction = 1.0 / (max + 1) as f32;

        for _ in 0..=max {
            let mut new_pos = *pos + *vel * fraction;

            if self.test_box(new_pos, size) {
                let mut hits = 0;

                if self.test_box(Vec2::new(pos.x, new_pos.y), size) {
                    new_pos.y = pos.y;
                    vel.y *= -elasticity;
                    hits += 1;
                }

                if self.test_box(Vec2::new(new_pos.x, pos.y), size) {
                    new_pos.x = pos.x;
                    vel.x *= -elasticity;
                    hits += 1;
                }

                // diagonal corner hit, neither axis alone collides
                if hits == 0 {
                    new_pos = *pos;
                    *vel *= -elasticity;
                }
            }

            *pos = new_pos;
        }
    }

    /// True once a position has drifted far outside the playable area
    pub fn game_layer_clipped(&self, pos: Vec2) -> bool {
        let rx = pos.x.round() as i32 / TILE_SIZE as i32;
        let ry = pos.y.round() as i32 / TILE_SIZE as i32;
        rx < -GAME_LAYER_MARGIN
            || rx >= self.width as i32 + GAME_LAYER_MARGIN
            || ry < -GAME_LAYER_MARGIN
            || ry >= self.height as i32 + GAME_LAYER_MARGIN
    }

    /// Centre of the tile at grid coordinates
    pub fn tile_center(x: usize, y: usize) -> Vec2 {
        Vec2::new(
            x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
            y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        )
    }

    /// Free tiles with solid ground directly below, usable as spawn points
    pub fn spawn_points(&self) -> Vec<Vec2> {
        let mut points = Vec::new();
        for y in 0..self.height.saturating_sub(1) {
            for x in 0..self.width {
                let here = self.tiles[y * self.width + x];
                let below = self.tiles[(y + 1) * self.width + x];
                if here == Tile::Air && below.is_solid() {
                    points.push(Self::tile_center(x, y));
                }
            }
        }
        points
    }
}

/// Built-in arena used when no map file is configured
pub const DEFAULT_ARENA: &str = "\
##############################
#............................#
#............................#
#......B..............E......#
#............................#
#.........######.............#
#............................#
#...NNN............012.......#
#..........FFFF..............#
#############....#############
#...........#....#...........#
#............................#
#......X.............U.......#
##############################
";

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed() -> Collision {
        Collision::from_ascii(
            "#####\n\
             #...#\n\
             #...#\n\
             #####",
        )
        .unwrap()
    }

    #[test]
    fn parses_ascii_tiles() {
        let map = Collision::from_ascii("#F3\nXNU").unwrap();
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 2);
        assert_eq!(map.tile_at(Vec2::new(40.0, 10.0)), Tile::Freeze);
        assert_eq!(map.tile_at(Vec2::new(70.0, 10.0)), Tile::ColorFreeze(3));
        assert_eq!(map.tile_at(Vec2::new(10.0, 40.0)), Tile::Death);
        assert!(map.tile_at(Vec2::new(40.0, 40.0)).is_solid());
    }

    #[test]
    fn rejects_bad_maps() {
        assert_eq!(Collision::from_ascii("").unwrap_err(), MapError::Empty);
        assert!(matches!(
            Collision::from_ascii("##\n#").unwrap_err(),
            MapError::Ragged { row: 1, .. }
        ));
        assert!(matches!(
            Collision::from_ascii("#?").unwrap_err(),
            MapError::UnknownTile { ch: '?', .. }
        ));
    }

    #[test]
    fn move_box_stops_at_floor() {
        let map = boxed();
        let mut pos = Vec2::new(48.0, 48.0);
        let mut vel = Vec2::new(0.0, 40.0);
        map.move_box(&mut pos, &mut vel, Vec2::splat(28.0), 0.0);
        assert!(!map.test_box(pos, Vec2::splat(28.0)));
        assert!(pos.y < 96.0 - 14.0 + 1.0);
        assert_eq!(vel.y, 0.0);
    }

    #[test]
    fn line_hits_wall() {
        let map = boxed();
        let hit = map
            .intersect_line(Vec2::new(48.0, 48.0), Vec2::new(200.0, 48.0))
            .unwrap();
        assert!(hit.pos.x >= 128.0);
        assert!(hit.before.x < hit.pos.x);
        assert!(map
            .intersect_line(Vec2::new(48.0, 48.0), Vec2::new(100.0, 48.0))
            .is_none());
    }

    #[test]
    fn clipping_far_outside() {
        let map = boxed();
        assert!(!map.game_layer_clipped(Vec2::new(-10.0, -10.0)));
        assert!(map.game_layer_clipped(Vec2::new(-300.0 * TILE_SIZE, 0.0)));
    }

    #[test]
    fn default_arena_parses() {
        let map = Collision::from_ascii(DEFAULT_ARENA).unwrap();
        assert!(!map.spawn_points().is_empty());
    }
}
