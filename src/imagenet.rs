//! Background corpus index (tiny-imagenet-200 layout)
//!
//! ```text
//! <root>/wnids.txt               one WordNet id per line
//! <root>/words.txt               "<wnid>\t<synonym>, <synonym>, ..."
//! <root>/train/<wnid>/images/    class images
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DatasetError;

/// One class of the background corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundClass {
    pub wnid: String,
    pub synonyms: Vec<String>,
}

impl BackgroundClass {
    /// Canonical lowercase name (first synonym)
    pub fn name(&self) -> String {
        self.synonyms
            .first()
            .map(|s| s.to_lowercase())
            .unwrap_or_default()
    }

    fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.synonyms
            .iter()
            .any(|word| word.to_lowercase().contains(&query))
    }
}

/// Index over the classes present in the background corpus
#[derive(Debug, Clone)]
pub struct BackgroundCorpus {
    root: PathBuf,
    classes: Vec<BackgroundClass>,
}

impl BackgroundCorpus {
    /// Load `wnids.txt` and `words.txt` from the corpus root
    pub fn load(root: &Path) -> Result<Self, DatasetError> {
        let wnids_path = root.join("wnids.txt");
        let words_path = root.join("words.txt");
        let wnids = read_index(&wnids_path)?;
        let words = read_index(&words_path)?;

        let present: HashSet<&str> = wnids.lines().map(str::trim).collect();
        let classes: Vec<BackgroundClass> = words
            .lines()
            .filter_map(|line| {
                let (wnid, synonyms) = line.split_once('\t')?;
                if !present.contains(wnid) {
                    return None;
                }
                Some(BackgroundClass {
                    wnid: wnid.to_string(),
                    synonyms: synonyms.trim().split(", ").map(str::to_string).collect(),
                })
            })
            .collect();

        debug!(
            "Background corpus {}: {} classes",
            root.display(),
            classes.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            classes,
        })
    }

    /// All indexed classes, in `words.txt` order
    pub fn classes(&self) -> &[BackgroundClass] {
        &self.classes
    }

    /// Canonical class names, used for random sampling
    pub fn class_names(&self) -> Vec<String> {
        self.classes.iter().map(BackgroundClass::name).collect()
    }

    /// Resolve a class name by case-insensitive substring match on synonyms
    ///
    /// When several classes match, the last one in `words.txt` wins.
    pub fn find_class(&self, name: &str) -> Option<&BackgroundClass> {
        self.classes.iter().rev().find(|class| class.matches(name))
    }

    /// Image directory for a resolved class
    pub fn class_image_dir(&self, class: &BackgroundClass) -> PathBuf {
        self.root.join("train").join(&class.wnid).join("images")
    }

    /// All image paths for a class name, sorted by file name
    pub fn image_paths(&self, name: &str) -> Result<Vec<PathBuf>, DatasetError> {
        let class = self.find_class(name).ok_or_else(|| {
            DatasetError::NotFound(format!(
                "Couldn't find any imagenet concept for '{name}'. Make sure you're getting a valid concept"
            ))
        })?;
        let dir = self.class_image_dir(class);
        if !dir.is_dir() {
            return Err(DatasetError::NotFound(format!(
                "Path to images does not exist for imagenet concept {name} ({})",
                dir.display()
            )));
        }
        list_files(&dir)
    }
}

fn read_index(path: &Path) -> Result<String, DatasetError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => {
            DatasetError::NotFound(format!("Background corpus index {}", path.display()))
        }
        _ => DatasetError::io(path, e),
    })
}

/// Regular files directly inside `dir`, sorted
pub(crate) fn list_files(dir: &Path) -> Result<Vec<PathBuf>, DatasetError> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| DatasetError::io(dir, e))? {
        let entry = entry.map_err(|e| DatasetError::io(dir, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
