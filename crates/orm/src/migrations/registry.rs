//! Migration Registry - Discovers migration files on disk
//!
//! Files follow `NNN_descriptive_name.sql`, with an optional inverse script
//! `NNN_descriptive_name_rollback.sql` sharing the same version prefix. Any
//! `.sql` file that does not follow the convention is rejected rather than
//! skipped; other files in the directory are ignored.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::definitions::{compute_checksum, MigrationConfig, MigrationDefinition, MigrationVersion};
use crate::error::{MigrationError, MigrationResult};

static MIGRATION_FILENAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)_([A-Za-z0-9][A-Za-z0-9_-]*?)(_rollback)?\.sql$")
        .expect("migration filename pattern is valid")
});

const ROLLBACK_SUFFIX: &str = "_rollback";

/// A migration filename broken into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFilename {
    pub version: MigrationVersion,
    pub name: String,
    pub is_rollback: bool,
}

/// Migration registry for discovering and creating migration files
pub struct MigrationRegistry {
    config: MigrationConfig,
}

impl MigrationRegistry {
    /// Create a registry with custom configuration
    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    /// Get the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Parse a filename against the naming convention.
    ///
    /// Returns `Ok(None)` for files that are not SQL scripts at all.
    pub fn parse_filename(&self, filename: &str) -> MigrationResult<Option<MigrationFilename>> {
        if !filename.ends_with(".sql") {
            return Ok(None);
        }

        let captures = MIGRATION_FILENAME.captures(filename).ok_or_else(|| {
            MigrationError::InvalidDefinition(format!(
                "'{}' does not match the naming convention {}_name.sql",
                filename,
                "N".repeat(self.config.version_width)
            ))
        })?;

        let version = MigrationVersion::parse(&captures[1])?;
        if version.width() != self.config.version_width {
            return Err(MigrationError::InvalidDefinition(format!(
                "'{}' has a {}-digit version prefix; expected exactly {} digits",
                filename,
                version.width(),
                self.config.version_width
            )));
        }

        Ok(Some(MigrationFilename {
            version,
            name: captures[2].to_string(),
            is_rollback: captures.get(3).is_some(),
        }))
    }

    /// Load all migrations from the migrations directory, ascending by version.
    ///
    /// A missing directory is an empty registry.
    pub fn discover(&self) -> MigrationResult<Vec<MigrationDefinition>> {
        let dir = &self.config.migrations_dir;
        if !dir.exists() {
            tracing::debug!("Migrations directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }

        let mut forwards: BTreeMap<MigrationVersion, (String, PathBuf)> = BTreeMap::new();
        let mut rollbacks: HashMap<MigrationVersion, PathBuf> = HashMap::new();

        for path in self.list_files(dir)? {
            let filename = match path.file_name().and_then(|s| s.to_str()) {
                Some(filename) => filename,
                None => {
                    return Err(MigrationError::InvalidDefinition(format!(
                        "Migration filename is not valid UTF-8: {}",
                        path.display()
                    )))
                }
            };

            let parsed = match self.parse_filename(filename)? {
                Some(parsed) => parsed,
                None => {
                    tracing::trace!("Ignoring non-migration file {}", filename);
                    continue;
                }
            };

            if parsed.is_rollback {
                if let Some(existing) = rollbacks.insert(parsed.version.clone(), path.clone()) {
                    return Err(duplicate_version(&parsed.version, &existing, &path));
                }
            } else if let Some((_, existing)) = forwards.get(&parsed.version) {
                return Err(duplicate_version(&parsed.version, existing, &path));
            } else {
                forwards.insert(parsed.version, (parsed.name, path));
            }
        }

        if let Some((version, path)) = rollbacks
            .iter()
            .filter(|(version, _)| !forwards.contains_key(*version))
            .min_by(|a, b| a.0.cmp(b.0))
        {
            return Err(MigrationError::InvalidDefinition(format!(
                "Rollback script {} has no forward migration with version {}",
                path.display(),
                version
            )));
        }

        let mut definitions = Vec::with_capacity(forwards.len());
        for (version, (name, path)) in forwards {
            let bytes = read_file(&path)?;
            let checksum = compute_checksum(&bytes);
            let forward_script = into_utf8(bytes, &path)?;

            let rollback_path = rollbacks.remove(&version);
            let rollback_script = match &rollback_path {
                Some(rollback_path) => Some(into_utf8(read_file(rollback_path)?, rollback_path)?),
                None => None,
            };

            definitions.push(MigrationDefinition {
                version,
                name,
                forward_script,
                checksum,
                rollback_script,
                path,
                rollback_path,
            });
        }

        tracing::debug!(
            "Discovered {} migration(s) in {}",
            definitions.len(),
            dir.display()
        );
        Ok(definitions)
    }

    /// Create the next-numbered forward and rollback migration files.
    ///
    /// Returns the paths of the forward and rollback scripts.
    pub fn create_migration(&self, name: &str) -> MigrationResult<(PathBuf, PathBuf)> {
        let slug = slugify(name);
        if slug.is_empty() {
            return Err(MigrationError::InvalidDefinition(format!(
                "'{}' does not contain any usable characters for a migration name",
                name
            )));
        }

        let existing = self.discover()?;
        let next = match existing.last() {
            Some(last) => last.version.numeric_value().map(|n| n + 1).ok_or_else(|| {
                MigrationError::InvalidDefinition(format!("Version {} is out of range", last.version))
            })?,
            None => 0,
        };

        let width = self.config.version_width;
        let version = format!("{:0width$}", next, width = width);
        if version.len() > width {
            return Err(MigrationError::InvalidDefinition(format!(
                "No {}-digit version left after {}",
                width,
                existing.last().map(|d| d.version.to_string()).unwrap_or_default()
            )));
        }

        let forward_name = format!("{}_{}.sql", version, slug);
        let rollback_name = format!("{}_{}{}.sql", version, slug, ROLLBACK_SUFFIX);
        self.check_scaffold_names(name, &forward_name, &rollback_name)?;

        fs::create_dir_all(&self.config.migrations_dir).map_err(|e| {
            MigrationError::InvalidDefinition(format!(
                "Failed to create migrations directory {}: {}",
                self.config.migrations_dir.display(),
                e
            ))
        })?;

        let forward_path = self.config.migrations_dir.join(&forward_name);
        let rollback_path = self.config.migrations_dir.join(&rollback_name);
        for path in [&forward_path, &rollback_path] {
            if path.exists() {
                return Err(MigrationError::InvalidDefinition(format!(
                    "Migration file {} already exists",
                    path.display()
                )));
            }
        }

        let created = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        write_new_file(
            &forward_path,
            &format!(
                "-- Migration: {} {}\n-- Created: {}\n\n-- Add your schema changes here\n",
                version, slug, created
            ),
        )?;
        if let Err(err) = write_new_file(
            &rollback_path,
            &format!(
                "-- Rollback: {} {}\n-- Created: {}\n\n-- Reverse the changes made by {}\n",
                version, slug, created, forward_name
            ),
        ) {
            if let Err(cleanup_err) = fs::remove_file(&forward_path) {
                tracing::warn!(
                    "Failed to remove {} after an incomplete create: {}",
                    forward_path.display(),
                    cleanup_err
                );
            }
            return Err(err);
        }

        Ok((forward_path, rollback_path))
    }

    /// The generated pair must read back as one forward script and its rollback
    fn check_scaffold_names(&self, name: &str, forward: &str, rollback: &str) -> MigrationResult<()> {
        let forward_parsed = self.parse_filename(forward)?;
        let rollback_parsed = self.parse_filename(rollback)?;

        match (forward_parsed, rollback_parsed) {
            (Some(f), Some(r)) if !f.is_rollback && r.is_rollback && f.name == r.name => Ok(()),
            _ => Err(MigrationError::InvalidDefinition(format!(
                "'{}' cannot be used as a migration name: {} would not be read back as a forward migration",
                name, forward
            ))),
        }
    }

    fn list_files(&self, dir: &Path) -> MigrationResult<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|e| {
            MigrationError::InvalidDefinition(format!(
                "Failed to read migrations directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrationError::InvalidDefinition(format!("Failed to read directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.is_file() {
                files.push(path);
            }
        }

        // Deterministic error reporting regardless of directory order
        files.sort();
        Ok(files)
    }
}

impl Default for MigrationRegistry {
    fn default() -> Self {
        Self::with_config(MigrationConfig::default())
    }
}

fn duplicate_version(version: &MigrationVersion, first: &Path, second: &Path) -> MigrationError {
    MigrationError::InvalidDefinition(format!(
        "Version {} is used by both {} and {}",
        version,
        first.display(),
        second.display()
    ))
}

fn read_file(path: &Path) -> MigrationResult<Vec<u8>> {
    fs::read(path).map_err(|e| {
        MigrationError::InvalidDefinition(format!(
            "Failed to read migration file {}: {}",
            path.display(),
            e
        ))
    })
}

fn into_utf8(bytes: Vec<u8>, path: &Path) -> MigrationResult<String> {
    String::from_utf8(bytes).map_err(|_| {
        MigrationError::InvalidDefinition(format!(
            "Migration file {} is not valid UTF-8",
            path.display()
        ))
    })
}

fn write_new_file(path: &Path, content: &str) -> MigrationResult<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            MigrationError::InvalidDefinition(format!(
                "Failed to create migration file {}: {}",
                path.display(),
                e
            ))
        })?;

    file.write_all(content.as_bytes()).map_err(|e| {
        MigrationError::InvalidDefinition(format!(
            "Failed to write migration file {}: {}",
            path.display(),
            e
        ))
    })
}

/// Turn a free-form name into a filename slug: `Add due dates` -> `add_due_dates`
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let mut slug = slug.trim_matches('_');
    while let Some(stripped) = slug.strip_suffix(ROLLBACK_SUFFIX) {
        slug = stripped;
    }
    slug.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry_in(dir: &TempDir) -> MigrationRegistry {
        MigrationRegistry::with_config(MigrationConfig {
            migrations_dir: dir.path().to_path_buf(),
            ..MigrationConfig::default()
        })
    }

    fn write(dir: &TempDir, filename: &str, content: &str) {
        fs::write(dir.path().join(filename), content).unwrap();
    }

    #[test]
    fn test_parse_filename() {
        let registry = MigrationRegistry::default();

        let parsed = registry.parse_filename("001_create_todos_table.sql").unwrap().unwrap();
        assert_eq!(parsed.version.as_str(), "001");
        assert_eq!(parsed.name, "create_todos_table");
        assert!(!parsed.is_rollback);

        let parsed = registry
            .parse_filename("001_create_todos_table_rollback.sql")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.name, "create_todos_table");
        assert!(parsed.is_rollback);

        assert!(registry.parse_filename("README.md").unwrap().is_none());
        assert!(registry.parse_filename("1_short.sql").is_err());
        assert!(registry.parse_filename("0001_too_wide.sql").is_err());
        assert!(registry.parse_filename("create_todos.sql").is_err());
        assert!(registry.parse_filename("001-create.sql").is_err());
    }

    #[test]
    fn test_discover_orders_and_pairs_rollbacks() {
        let dir = TempDir::new().unwrap();
        write(&dir, "002_add_due_dates.sql", "ALTER TABLE todos ADD COLUMN due_at TEXT;");
        write(&dir, "000_create_users_table.sql", "CREATE TABLE users (id INTEGER);");
        write(&dir, "001_create_todos_table.sql", "CREATE TABLE todos (id INTEGER);");
        write(&dir, "001_create_todos_table_rollback.sql", "DROP TABLE todos;");
        write(&dir, "notes.txt", "not a migration");

        let definitions = registry_in(&dir).discover().unwrap();
        let versions: Vec<&str> = definitions.iter().map(|d| d.version.as_str()).collect();
        assert_eq!(versions, vec!["000", "001", "002"]);

        assert!(definitions[0].rollback_script.is_none());
        assert_eq!(definitions[1].rollback_script.as_deref(), Some("DROP TABLE todos;"));
        assert_eq!(
            definitions[1].checksum,
            compute_checksum(b"CREATE TABLE todos (id INTEGER);")
        );
        assert_eq!(definitions[2].name, "add_due_dates");
    }

    #[test]
    fn test_discover_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let registry = MigrationRegistry::with_config(MigrationConfig {
            migrations_dir: dir.path().join("absent"),
            ..MigrationConfig::default()
        });
        assert!(registry.discover().unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_forward_version_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "001_create_todos.sql", "SELECT 1;");
        write(&dir, "001_create_tasks.sql", "SELECT 2;");

        let err = registry_in(&dir).discover().unwrap_err();
        match err {
            MigrationError::InvalidDefinition(msg) => {
                assert!(msg.contains("001"));
                assert!(msg.contains("001_create_tasks.sql"));
                assert!(msg.contains("001_create_todos.sql"));
            }
            other => panic!("expected InvalidDefinition, got {:?}", other),
        }
    }

    #[test]
    fn test_orphan_and_duplicate_rollbacks_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "003_drop_things_rollback.sql", "SELECT 1;");
        assert!(matches!(
            registry_in(&dir).discover(),
            Err(MigrationError::InvalidDefinition(_))
        ));

        let dir = TempDir::new().unwrap();
        write(&dir, "001_a.sql", "SELECT 1;");
        write(&dir, "001_a_rollback.sql", "SELECT 2;");
        write(&dir, "001_b_rollback.sql", "SELECT 3;");
        assert!(matches!(
            registry_in(&dir).discover(),
            Err(MigrationError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_malformed_sql_filename_rejected() {
        let dir = TempDir::new().unwrap();
        write(&dir, "001_ok.sql", "SELECT 1;");
        write(&dir, "seed.sql", "SELECT 2;");
        assert!(matches!(
            registry_in(&dir).discover(),
            Err(MigrationError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_non_utf8_script_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_binary.sql"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(
            registry_in(&dir).discover(),
            Err(MigrationError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_create_migration_numbers_sequentially() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        let (forward, rollback) = registry.create_migration("Create todos table").unwrap();
        assert_eq!(forward.file_name().unwrap(), "000_create_todos_table.sql");
        assert_eq!(
            rollback.file_name().unwrap(),
            "000_create_todos_table_rollback.sql"
        );

        let (forward, _) = registry.create_migration("add-due dates").unwrap();
        assert_eq!(forward.file_name().unwrap(), "001_add_due_dates.sql");

        let definitions = registry.discover().unwrap();
        assert_eq!(definitions.len(), 2);
        assert!(definitions.iter().all(|d| d.has_rollback()));
        assert!(definitions[0].forward_script.contains("-- Migration: 000 create_todos_table"));
    }

    #[test]
    fn test_create_migration_rejects_empty_name() {
        let dir = TempDir::new().unwrap();
        assert!(registry_in(&dir).create_migration("  !!  ").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Add due dates"), "add_due_dates");
        assert_eq!(slugify("  --weird__name--  "), "weird_name");
        assert_eq!(slugify("undo_rollback"), "undo");
        assert_eq!(slugify("undo rollback rollback"), "undo");
        assert_eq!(slugify("rollback"), "rollback");
    }

    #[test]
    fn test_create_migration_with_repeated_rollback_suffix() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);

        let (forward, rollback) = registry.create_migration("undo rollback rollback").unwrap();
        assert_eq!(forward.file_name().unwrap(), "000_undo.sql");
        assert_eq!(rollback.file_name().unwrap(), "000_undo_rollback.sql");

        let (forward, _) = registry.create_migration("rollback").unwrap();
        assert_eq!(forward.file_name().unwrap(), "001_rollback.sql");

        let definitions = registry.discover().unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].name, "undo");
        assert_eq!(definitions[1].name, "rollback");
        assert!(definitions.iter().all(|d| d.has_rollback()));
    }

    #[test]
    fn test_create_migration_leaves_no_half_pair() {
        let dir = TempDir::new().unwrap();
        let registry = registry_in(&dir);
        write(&dir, "000_seed.sql", "SELECT 1;");
        // Occupies the rollback path; discovery only lists regular files
        fs::create_dir(dir.path().join("001_add_labels_rollback.sql")).unwrap();

        let err = registry.create_migration("add labels").unwrap_err();
        assert!(matches!(err, MigrationError::InvalidDefinition(ref msg) if msg.contains("already exists")));
        assert!(!dir.path().join("001_add_labels.sql").exists());
    }
}
