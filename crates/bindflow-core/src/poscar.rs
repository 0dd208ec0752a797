//! Minimal reading of VASP structure files (POSCAR/CONTCAR), enough to compare
//! atom counts between a relaxed structure and the decks derived from it.

use crate::errors::ConfigError;
use std::path::Path;

fn parse_counts(line: &str) -> Option<usize> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.is_empty() {
        return None;
    }
    tokens
        .iter()
        .map(|t| t.parse::<usize>().ok())
        .sum::<Option<usize>>()
}

/// Total number of atoms declared in a POSCAR-format document.
///
/// Handles both the VASP 5 layout (element symbols on line 6, counts on line 7)
/// and the older layout where counts follow the lattice vectors directly.
pub fn atom_count_from_str(content: &str) -> Option<usize> {
    let lines: Vec<&str> = content.lines().collect();
    let sixth = lines.get(5)?;
    if let Some(count) = parse_counts(sixth) {
        return Some(count);
    }
    lines.get(6).and_then(|line| parse_counts(line))
}

pub fn atom_count(path: &Path) -> Result<usize, ConfigError> {
    let content = fs_err::read_to_string(path)?;
    atom_count_from_str(&content).ok_or_else(|| {
        ConfigError::General(format!(
            "Could not read atom counts from structure file '{}'",
            path.display()
        ))
    })
}
