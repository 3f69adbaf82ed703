//! Heavy-stage rotations and the tuned configuration registry
//!
//! A rotation is one of the 20 possible heavy triples. Tuning stores one
//! flag vector per rotation; the miner later picks the vector whose
//! rotation matches the heavy ids of the live sequence.
//!
//! ## File format
//!
//! ```text
//! 0 0 1 0 0 0
//! 1 0 0 0 0 1
//! ...            (20 lines, rotation order)
//! ```

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::memory::HeavyFlags;
use crate::params::*;

/// Ordered triple of heavy alphabet ids
pub type Rotation = [u8; HEAVY_PER_SEQUENCE];

/// Every 3-element subset of the heavy alphabet, lexicographic order
pub const ROTATION_TABLE: [Rotation; ROTATIONS] = [
    [0, 1, 2],
    [0, 1, 3],
    [0, 1, 4],
    [0, 1, 5],
    [0, 2, 3],
    [0, 2, 4],
    [0, 2, 5],
    [0, 3, 4],
    [0, 3, 5],
    [0, 4, 5],
    [1, 2, 3],
    [1, 2, 4],
    [1, 2, 5],
    [1, 3, 4],
    [1, 3, 5],
    [1, 4, 5],
    [2, 3, 4],
    [2, 3, 5],
    [2, 4, 5],
    [3, 4, 5],
];

#[derive(Error, Debug)]
pub enum TuneError {
    #[error("tune file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tune file line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Flag vector for combination `combo` (0..8) of a rotation
///
/// Bit k of `combo` becomes the flag of the rotation's k-th heavy id; the
/// three ids outside the rotation stay at 0.
pub fn combo_flags(rotation: &Rotation, combo: usize) -> HeavyFlags {
    let mut flags = [0u8; HEAVY_COUNT];
    for (bit, &id) in rotation.iter().enumerate() {
        flags[id as usize] = ((combo >> bit) & 1) as u8;
    }
    flags
}

/// Tuned flag vector per rotation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuneTable {
    configs: [HeavyFlags; ROTATIONS],
}

impl TuneTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, rotation: usize) -> &HeavyFlags {
        &self.configs[rotation]
    }

    pub fn set(&mut self, rotation: usize, flags: HeavyFlags) {
        self.configs[rotation] = flags;
    }

    /// Find the rotation holding exactly these heavy ids, in any order
    ///
    /// Returns the rotation index and its flags.
    pub fn lookup(&self, heavy_ids: [u8; HEAVY_PER_SEQUENCE]) -> Option<(usize, HeavyFlags)> {
        ROTATION_TABLE
            .iter()
            .position(|rot| rot.iter().all(|id| heavy_ids.contains(id)))
            .map(|index| (index, self.configs[index]))
    }

    /// Render as the persisted text format
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(ROTATIONS * HEAVY_COUNT * 2);
        for flags in &self.configs {
            let line: Vec<String> = flags.iter().map(|f| f.to_string()).collect();
            out.push_str(&line.join(" "));
            out.push('\n');
        }
        out
    }

    /// Parse the persisted text format
    pub fn parse(text: &str) -> Result<Self, TuneError> {
        let mut table = Self::new();
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

        for (rotation, configs) in table.configs.iter_mut().enumerate() {
            let Some((index, line)) = lines.next() else {
                return Err(TuneError::Parse {
                    line: rotation + 1,
                    reason: format!("expected {ROTATIONS} lines, found {rotation}"),
                });
            };
            let values: Vec<&str> = line.split_whitespace().collect();
            if values.len() != HEAVY_COUNT {
                return Err(TuneError::Parse {
                    line: index + 1,
                    reason: format!("expected {HEAVY_COUNT} flags, found {}", values.len()),
                });
            }
            for (flag, value) in configs.iter_mut().zip(values) {
                *flag = match value {
                    "0" => 0,
                    "1" => 1,
                    other => {
                        return Err(TuneError::Parse {
                            line: index + 1,
                            reason: format!("flag must be 0 or 1, got {other:?}"),
                        });
                    }
                };
            }
        }

        if let Some((index, _)) = lines.next() {
            return Err(TuneError::Parse {
                line: index + 1,
                reason: format!("unexpected data after {ROTATIONS} lines"),
            });
        }

        Ok(table)
    }

    /// Write the table to `path`, truncating any previous content
    pub fn save(&self, path: &Path) -> Result<(), TuneError> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, TuneError> {
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_table_covers_all_triples() {
        let mut seen = std::collections::HashSet::new();
        for rot in &ROTATION_TABLE {
            assert!(rot[0] < rot[1] && rot[1] < rot[2]);
            assert!((rot[2] as usize) < HEAVY_COUNT);
            seen.insert(*rot);
        }
        assert_eq!(seen.len(), ROTATIONS);
    }

    #[test]
    fn test_combo_flags() {
        let rot = [1, 3, 5];
        assert_eq!(combo_flags(&rot, 0), [0, 0, 0, 0, 0, 0]);
        assert_eq!(combo_flags(&rot, 1), [0, 1, 0, 0, 0, 0]);
        assert_eq!(combo_flags(&rot, 2), [0, 0, 0, 1, 0, 0]);
        assert_eq!(combo_flags(&rot, 4), [0, 0, 0, 0, 0, 1]);
        assert_eq!(combo_flags(&rot, 7), [0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn test_lookup_is_order_independent() {
        let mut table = TuneTable::new();
        table.set(7, [1, 0, 0, 1, 1, 0]);

        // Rotation 7 is [0, 3, 4]
        for ids in [[0, 3, 4], [4, 0, 3], [3, 4, 0]] {
            assert_eq!(table.lookup(ids), Some((7, [1, 0, 0, 1, 1, 0])));
        }
    }

    #[test]
    fn test_lookup_miss() {
        let table = TuneTable::new();
        // Repeated ids never appear in a derived sequence and match nothing
        assert_eq!(table.lookup([2, 2, 2]), None);
    }

    #[test]
    fn test_to_text_layout() {
        let mut table = TuneTable::new();
        table.set(0, [1, 0, 1, 0, 0, 0]);
        table.set(19, [0, 0, 0, 1, 1, 1]);

        let text = table.to_text();
        assert!(text.ends_with('\n'));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), ROTATIONS);
        assert_eq!(lines[0], "1 0 1 0 0 0");
        assert_eq!(lines[1], "0 0 0 0 0 0");
        assert_eq!(lines[19], "0 0 0 1 1 1");
        assert_eq!(TuneTable::parse(&text).unwrap(), table);
    }

    #[test]
    fn test_parse_rejects_bad_flag() {
        let mut text = TuneTable::new().to_text();
        text.replace_range(0..1, "2");
        match TuneTable::parse(&text) {
            Err(TuneError::Parse { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_short_file() {
        let text = "0 0 0 0 0 0\n".repeat(ROTATIONS - 1);
        assert!(matches!(
            TuneTable::parse(&text),
            Err(TuneError::Parse { line: 20, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_wrong_width() {
        let mut text = String::from("0 0 0 0 0\n");
        text.push_str(&"0 0 0 0 0 0\n".repeat(ROTATIONS - 1));
        assert!(matches!(
            TuneTable::parse(&text),
            Err(TuneError::Parse { line: 1, .. })
        ));
    }
}
