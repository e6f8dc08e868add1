//! Texture concept catalog
//!
//! The candidate concept set is the 47 DTD textures shipped with Broden.

use std::path::Path;

use crate::error::DatasetError;

/// Compiled-in texture catalog, in Broden metadata order
pub const TEXTURE_CONCEPTS: [&str; 47] = [
    "blotchy",
    "dotted",
    "banded",
    "striped",
    "bumpy",
    "smeared",
    "knitted",
    "porous",
    "pitted",
    "fibrous",
    "veined",
    "perforated",
    "woven",
    "meshed",
    "crosshatched",
    "sprinkled",
    "polka-dotted",
    "marbled",
    "stained",
    "grid",
    "gauzy",
    "interlaced",
    "frilly",
    "zigzagged",
    "spiralled",
    "swirly",
    "cracked",
    "studded",
    "matted",
    "flecked",
    "potholed",
    "scaly",
    "stratified",
    "braided",
    "lined",
    "wrinkled",
    "paisley",
    "waffled",
    "freckled",
    "honeycombed",
    "lacelike",
    "chequered",
    "crystalline",
    "bubbly",
    "grooved",
    "pleated",
    "cobwebbed",
];

/// Column of the concept name in `c_texture.csv`
const NAME_COLUMN: usize = 2;

/// All texture concepts from the compiled-in catalog
pub fn all_texture_concepts() -> Vec<String> {
    TEXTURE_CONCEPTS.iter().map(|s| (*s).to_string()).collect()
}

/// Load texture concepts from a comma-delimited metadata file
///
/// The first line is a header. Order is preserved and duplicates are kept.
pub fn load_texture_concepts(path: &Path) -> Result<Vec<String>, DatasetError> {
    let content = std::fs::read_to_string(path).map_err(|e| DatasetError::io(path, e))?;
    parse_texture_concepts(&content).map_err(|(line, message)| DatasetError::Metadata {
        path: path.to_path_buf(),
        line,
        message,
    })
}

fn parse_texture_concepts(content: &str) -> Result<Vec<String>, (usize, String)> {
    let mut concepts = Vec::new();
    for (idx, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let name = line
            .split(',')
            .nth(NAME_COLUMN)
            .map(str::trim)
            .ok_or_else(|| (idx + 1, format!("expected at least {} columns", NAME_COLUMN + 1)))?;
        if name.is_empty() {
            return Err((idx + 1, "empty concept name".to_string()));
        }
        concepts.push(name.to_string());
    }
    Ok(concepts)
}

/// Drop repeated concept names, keeping the first occurrence of each
pub fn unique_concepts(concepts: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    concepts
        .iter()
        .filter(|c| seen.insert(c.as_str()))
        .cloned()
        .collect()
}

/// Concepts for a run: metadata file when given, compiled-in catalog otherwise
pub fn resolve_concepts(texture_csv: Option<&Path>) -> Result<Vec<String>, DatasetError> {
    match texture_csv {
        Some(path) => load_texture_concepts(path),
        None => Ok(all_texture_concepts()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_size_and_order() {
        let concepts = all_texture_concepts();
        assert_eq!(concepts.len(), 47);
        assert_eq!(concepts[0], "blotchy");
        assert_eq!(concepts[46], "cobwebbed");
    }

    #[test]
    fn test_parse_skips_header_and_trims() {
        let csv = "number,name,texture,frequency\n1,t1,banded,120\r\n2,t2,blotchy,120\n\n";
        let concepts = parse_texture_concepts(csv).unwrap();
        assert_eq!(concepts, vec!["banded", "blotchy"]);
    }

    #[test]
    fn test_parse_keeps_duplicates() {
        let csv = "a,b,c\n1,x,dotted\n2,y,dotted\n";
        assert_eq!(parse_texture_concepts(csv).unwrap(), vec!["dotted", "dotted"]);
    }

    #[test]
    fn test_parse_rejects_short_rows() {
        let csv = "a,b,c\n1,x\n";
        let (line, _) = parse_texture_concepts(csv).unwrap_err();
        assert_eq!(line, 2);
    }

    #[test]
    fn test_unique_concepts_keeps_first_occurrence() {
        let concepts: Vec<String> = ["striped", "dotted", "striped", "banded", "dotted"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(unique_concepts(&concepts), vec!["striped", "dotted", "banded"]);
        assert_eq!(unique_concepts(&all_texture_concepts()), all_texture_concepts());
    }
}
