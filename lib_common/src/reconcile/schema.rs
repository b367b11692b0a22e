//! Column names of the applicant export and the groups of columns each stage
//! depends on.

use crate::configs::config_sys::RuntimeConfig;

pub const COL_APPLICATION_ID: &str = "応募ID";
pub const COL_MEMBER_ID: &str = "会員ID";
pub const COL_VENUE_NAME: &str = "教室名";
pub const COL_LAST_MODIFIED: &str = "更新日";
pub const COL_SEQUENCE_NUMBER: &str = "応募回数";
pub const COL_SEGMENT_FLAG: &str = "応募回数（セグメント）";

/// Columns overwritten by the merge when the extract carries a newer value.
pub const TRACKED_COLUMNS: [&str; 15] = [
    "企業群（セグメント）",
    "セグメント名",
    "入学年",
    "提出ステータス",
    "採用ステータス",
    "研修初日",
    "在籍確認",
    "データタイプ",
    "最終提出日",
    "請求確定日",
    "提出期限",
    "提出期限超過月数",
    "保留月数",
    "最終変更者",
    "更新日",
];

/// Tracked columns compared as dates rather than text.
pub const DATE_COLUMNS: [&str; 5] = ["研修初日", "最終提出日", "請求確定日", "提出期限", "更新日"];

/// Names of the columns the engine reads. Defaults follow the export layout;
/// every name can be overridden from the `[columns]` settings section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub application_id: String,
    pub member_id: String,
    pub venue_name: String,
    pub last_modified: String,
    pub sequence_number: String,
    pub segment_flag: String,
    pub tracked: Vec<String>,
    pub date_columns: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            application_id: COL_APPLICATION_ID.to_string(),
            member_id: COL_MEMBER_ID.to_string(),
            venue_name: COL_VENUE_NAME.to_string(),
            last_modified: COL_LAST_MODIFIED.to_string(),
            sequence_number: COL_SEQUENCE_NUMBER.to_string(),
            segment_flag: COL_SEGMENT_FLAG.to_string(),
            tracked: TRACKED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            date_columns: DATE_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Schema {
    /// Applies `columns:*` overrides on top of the default layout.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let defaults = Self::default();
        let name = |key: &str, default: String| {
            config
                .get(&format!("columns:{}", key))
                .map(str::to_string)
                .unwrap_or(default)
        };

        Self {
            application_id: name("application_id", defaults.application_id),
            member_id: name("member_id", defaults.member_id),
            venue_name: name("venue_name", defaults.venue_name),
            last_modified: name("last_modified", defaults.last_modified),
            sequence_number: name("sequence_number", defaults.sequence_number),
            segment_flag: name("segment_flag", defaults.segment_flag),
            tracked: config.list("columns:tracked").unwrap_or(defaults.tracked),
            date_columns: config
                .list("columns:date_columns")
                .unwrap_or(defaults.date_columns),
        }
    }

    pub fn is_date_column(&self, column: &str) -> bool {
        self.date_columns.iter().any(|c| c == column)
    }

    /// Columns the admission filter reads from both datasets.
    pub fn admission_columns(&self) -> Vec<&str> {
        vec![self.application_id.as_str(), self.venue_name.as_str()]
    }

    /// Columns the merge reads from both datasets.
    pub fn merge_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.application_id.as_str(), self.last_modified.as_str()];
        for column in &self.tracked {
            if !columns.contains(&column.as_str()) {
                columns.push(column.as_str());
            }
        }
        columns
    }

    /// Columns the sequence assigner reads and writes on the merged dataset.
    pub fn sequence_columns(&self) -> Vec<&str> {
        vec![
            self.application_id.as_str(),
            self.member_id.as_str(),
            self.sequence_number.as_str(),
            self.segment_flag.as_str(),
        ]
    }
}
