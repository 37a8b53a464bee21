use anyhow::{Context, Result};
use memmap2::Mmap;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use zip::ZipArchive;
use zip::read::ZipFile;

/// Provides the full set of class names a batch can be selected from.
pub trait ClassSource {
    fn list_all_names(&self) -> Result<BTreeSet<String>>;
}

/// Class names of a jar, in `/`-separated internal form without the `.class` suffix.
#[derive(Debug, Clone)]
pub struct JarCatalog {
    jar_path: PathBuf,
}

impl JarCatalog {
    pub fn new(jar_path: impl Into<PathBuf>) -> Self {
        Self {
            jar_path: jar_path.into(),
        }
    }

    pub fn jar_path(&self) -> &Path {
        &self.jar_path
    }
}

impl ClassSource for JarCatalog {
    fn list_all_names(&self) -> Result<BTreeSet<String>> {
        with_archive(&self.jar_path, |archive| {
            let mut names = BTreeSet::new();
            for i in 0..archive.len() {
                let entry = archive.by_index(i)?;
                if !entry.name().ends_with(".class") {
                    continue;
                }
                let Some(name) = contained_name(&entry) else {
                    warn!(
                        entry = entry.name(),
                        jar = %self.jar_path.display(),
                        "skipping class entry outside the jar root"
                    );
                    continue;
                };
                if let Some(name) = name.strip_suffix(".class") {
                    names.insert(name.replace('\\', "/"));
                }
            }
            Ok(names)
        })
    }
}

/// Reads the bytes of `class_name` and of every class nested in it (`Name$*.class`),
/// keyed by entry name. Nested classes are needed by decompilers that only see
/// the files they are handed.
pub fn read_class_family(jar_path: &Path, class_name: &str) -> Result<Vec<(String, Vec<u8>)>> {
    let own = format!("{class_name}.class");
    let nested = format!("{class_name}$");

    with_archive(jar_path, |archive| {
        let mut family = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(name) = contained_name(&entry).map(str::to_string) else {
                continue;
            };
            let is_member = name == own
                || name
                    .strip_prefix(&nested)
                    .is_some_and(|rest| rest.ends_with(".class") && !rest.contains(['/', '\\']));
            if !is_member {
                continue;
            }
            let mut bytes = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut bytes)
                .with_context(|| format!("Failed to read {name} from {}", jar_path.display()))?;
            family.push((name, bytes));
        }
        Ok(family)
    })
}

/// The entry name, if it is a relative path made of plain segments only
/// (no `.`, `..`, empty segment or root).
fn contained_name<'e>(entry: &'e ZipFile<'_>) -> Option<&'e str> {
    let path = entry.enclosed_name()?;
    let name = entry.name();
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)))
        && name
            .split(['/', '\\'])
            .all(|seg| !seg.is_empty() && seg != "." && seg != "..");
    plain.then_some(name)
}

fn with_archive<T>(
    jar_path: &Path,
    f: impl FnOnce(&mut ZipArchive<Cursor<&[u8]>>) -> Result<T>,
) -> Result<T> {
    let file = File::open(jar_path)
        .with_context(|| format!("Failed to open jar: {}", jar_path.display()))?;
    // SAFETY: The file is opened read-only and remains valid for the lifetime of the mmap.
    // The mmap is dropped before the file, ensuring memory safety.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap jar: {}", jar_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", jar_path.display()))?;
    f(&mut archive)
}
