use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use codetorch_config::codetorch_dir;
use codetorch_core::{DocumentKey, FunctionRecord};
use regex::Regex;

use crate::{RecordStore, StoreError, decode_records};

pub const SUMMARY_FILE_SUFFIX: &str = ".summary.json";
const UNTITLED_FILE_STEM: &str = "untitled";

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"|?*\\/]"#).expect("invalid file name pattern"));
static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("invalid whitespace pattern"));
static DOT_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.+").expect("invalid dot pattern"));
static UNDERSCORE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("invalid underscore pattern"));

/// Flattens a document key into a single readable file name stem.
///
/// `src/app.ts` becomes `src_app.ts`; separators, reserved characters and whitespace
/// turn into `_`, runs of `.` and `_` collapse, and neither may lead or trail.
pub fn safe_file_name(key: &DocumentKey) -> String {
    let replaced = INVALID_CHARS.replace_all(key.as_str(), "_");
    let replaced = WHITESPACE.replace_all(&replaced, "_");
    let collapsed = DOT_RUNS.replace_all(&replaced, ".");
    let trimmed = collapsed.trim_matches('.');
    let collapsed = UNDERSCORE_RUNS.replace_all(trimmed, "_");
    let safe = collapsed.trim_matches('_');

    if safe.is_empty() {
        UNTITLED_FILE_STEM.to_owned()
    } else {
        safe.to_owned()
    }
}

/// One pretty-printed JSON array per document under `.codetorch/`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn open(workspace_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = codetorch_dir(workspace_root);
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, key: &DocumentKey) -> PathBuf {
        self.dir
            .join(format!("{}{SUMMARY_FILE_SUFFIX}", safe_file_name(key)))
    }
}

impl RecordStore for JsonFileStore {
    fn load(&self, key: &DocumentKey) -> Result<Option<Vec<FunctionRecord>>, StoreError> {
        let path = self.record_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        Ok(decode_records(key, &path.to_string_lossy(), &content))
    }

    fn save(&self, key: &DocumentKey, records: &[FunctionRecord]) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(records)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(self.record_path(key), content)?;
        Ok(())
    }
}
