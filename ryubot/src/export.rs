//! Write-only archive of cleared conversations.
//!
//! Each clear produces one pretty-printed JSON file named
//! `<sanitized-name>-<chat-id>-<YYYY-MM-DD_HH-MM-SS>.json`. Files are created
//! with create-new semantics; a clash (two clears in the same second) gets a
//! `-1`, `-2`, … suffix. The running bot never reads these files back.

use crate::message::{ChatInfo, ChatKind};
use crate::mode::Mode;
use crate::session::{Session, Turn};
use chrono::{DateTime, Local};
use ryubot_common::config::ExportConfig;
use ryubot_common::util::truncate_chars;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Provider label recorded in every export.
pub const PROVIDER_NAME: &str = "DeepSeek";

/// Characters that are illegal in file names on at least one common platform.
const ILLEGAL_FILENAME_CHARS: &[char] = &['\\', '/', '*', '?', ':', '"', '<', '>', '|'];

const FILENAME_SUBSTITUTE: char = '-';

/// Upper bound on `-N` suffixes tried for one file stem.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Export failure. The in-memory session is already gone when this is
/// reported; callers only need to tell the user.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to serialize conversation: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to create export directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no free file name left for '{0}'")]
    NameExhausted(String),
}

#[derive(Debug, Serialize)]
struct ExportChatInfo {
    chat_id: i64,
    title: String,
    #[serde(rename = "type")]
    chat_type: ChatKind,
}

#[derive(Debug, Serialize)]
struct ExportModelInfo<'a> {
    model: &'static str,
    mode: &'a str,
    temperature: f64,
}

/// The archived form of one conversation.
#[derive(Debug, Serialize)]
pub struct ExportRecord<'a> {
    chat_info: ExportChatInfo,
    model_info: ExportModelInfo<'a>,
    context: Vec<&'a Turn>,
}

impl<'a> ExportRecord<'a> {
    pub fn new(chat: &ChatInfo, session: &'a Session, mode: &'a Mode) -> Self {
        Self {
            chat_info: ExportChatInfo {
                chat_id: chat.id,
                title: chat.display_name(),
                chat_type: chat.kind,
            },
            model_info: ExportModelInfo {
                model: PROVIDER_NAME,
                mode: &mode.model,
                temperature: mode.temperature,
            },
            context: session.turns().collect(),
        }
    }
}

/// Replace characters that are illegal in file names (and whitespace) with
/// `-`, then keep at most `max_len` characters.
pub fn sanitize_filename(name: &str, max_len: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if ILLEGAL_FILENAME_CHARS.contains(&c) || c.is_whitespace() || c.is_control() {
                FILENAME_SUBSTITUTE
            } else {
                c
            }
        })
        .collect();

    let truncated = truncate_chars(&replaced, max_len);
    if truncated.is_empty() {
        "chat".to_string()
    } else {
        truncated.to_string()
    }
}

/// File name stem (without extension) for a chat export.
pub fn export_file_stem(
    display_name: &str,
    chat_id: i64,
    at: DateTime<Local>,
    max_len: usize,
) -> String {
    format!(
        "{}-{}-{}",
        sanitize_filename(display_name, max_len),
        chat_id,
        at.format("%Y-%m-%d_%H-%M-%S")
    )
}

/// Writes cleared sessions to the export directory.
#[derive(Debug, Clone)]
pub struct ConversationExporter {
    dir: PathBuf,
    name_max_len: usize,
}

impl ConversationExporter {
    pub fn new(dir: impl Into<PathBuf>, name_max_len: usize) -> Self {
        Self {
            dir: dir.into(),
            name_max_len: name_max_len.max(1),
        }
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.dir_path(), config.name_max_len)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Serialize `session` with chat and mode metadata to a new file.
    pub async fn export(
        &self,
        chat: &ChatInfo,
        session: &Session,
        mode: &Mode,
    ) -> Result<PathBuf, ExportError> {
        self.export_at(chat, session, mode, Local::now()).await
    }

    async fn export_at(
        &self,
        chat: &ChatInfo,
        session: &Session,
        mode: &Mode,
        at: DateTime<Local>,
    ) -> Result<PathBuf, ExportError> {
        let record = ExportRecord::new(chat, session, mode);
        let json = serde_json::to_vec_pretty(&record)?;

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|source| ExportError::CreateDir {
                path: self.dir.clone(),
                source,
            })?;

        let stem = export_file_stem(&chat.display_name(), chat.id, at, self.name_max_len);
        let path = write_new_file(&self.dir, &stem, &json).await?;

        tracing::info!(
            chat_id = chat.id,
            turns = session.len(),
            path = %path.display(),
            "Conversation exported"
        );
        Ok(path)
    }
}

/// Create `<stem>.json`, or the first free `<stem>-N.json`, and write `bytes`.
async fn write_new_file(dir: &Path, stem: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let file_name = if attempt == 0 {
            format!("{stem}.json")
        } else {
            format!("{stem}-{attempt}.json")
        };
        let path = dir.join(file_name);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => return Err(ExportError::Write { path, source }),
        };

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;

        return match written {
            Ok(()) => Ok(path),
            Err(source) => Err(ExportError::Write { path, source }),
        };
    }

    Err(ExportError::NameExhausted(stem.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use test_case::test_case;

    fn private_chat() -> ChatInfo {
        ChatInfo {
            id: 12345,
            kind: ChatKind::Private,
            title: None,
            first_name: Some("Ryu Dev".into()),
            username: Some("ryudevpr".into()),
        }
    }

    fn session() -> Session {
        let mut s = Session::new();
        s.push_bounded(Turn::user("fix my code"), 30);
        s.push_bounded(Turn::assistant("done 🚀"), 30);
        s
    }

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 1, 31, 8, 5, 9).unwrap()
    }

    #[test_case("Ryu Dev", "Ryu-Dev" ; "whitespace")]
    #[test_case(r#"a\b/c*d?e:f"g<h>i|j"#, "a-b-c-d-e-f-g-h-i-j" ; "illegal characters")]
    #[test_case("tab\there", "tab-here" ; "control characters")]
    #[test_case("", "chat" ; "empty")]
    fn test_sanitize_filename(input: &str, expected: &str) {
        assert_eq!(sanitize_filename(input, 20), expected);
    }

    #[test]
    fn test_sanitize_truncates_by_characters() {
        assert_eq!(sanitize_filename("abcdefghijklmnopqrstuvwxyz", 20).len(), 20);
        let cjk = sanitize_filename("你好世界你好世界你好世界你好世界你好世界你好", 20);
        assert_eq!(cjk.chars().count(), 20);
    }

    #[test]
    fn test_export_file_stem_format() {
        let stem = export_file_stem("Ryu Dev", 12345, fixed_time(), 20);
        assert_eq!(stem, "Ryu-Dev-12345-2025-01-31_08-05-09");
    }

    #[test]
    fn test_record_shape() {
        let s = session();
        let mode = Mode::new("deepseek-chat", 1.3);
        let record = ExportRecord::new(&private_chat(), &s, &mode);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["chat_info"]["chat_id"], 12345);
        assert_eq!(json["chat_info"]["title"], "Ryu Dev");
        assert_eq!(json["chat_info"]["type"], "private");
        assert_eq!(json["model_info"]["model"], "DeepSeek");
        assert_eq!(json["model_info"]["mode"], "deepseek-chat");
        assert_eq!(json["context"][0]["role"], "user");
        assert_eq!(json["context"][1]["content"], "done 🚀");
    }

    #[tokio::test]
    async fn test_export_writes_pretty_json() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ConversationExporter::new(dir.path().join("conversation"), 20);
        let mode = Mode::new("deepseek-chat", 1.3);

        let path = exporter
            .export_at(&private_chat(), &session(), &mode, fixed_time())
            .await
            .unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "Ryu-Dev-12345-2025-01-31_08-05-09.json"
        );
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"chat_info\""));
        assert!(text.contains("done 🚀"));
    }

    #[tokio::test]
    async fn test_repeated_exports_in_same_second_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = ConversationExporter::new(dir.path(), 20);
        let mode = Mode::new("deepseek-chat", 1.3);

        let mut names = std::collections::HashSet::new();
        for _ in 0..3 {
            let path = exporter
                .export_at(&private_chat(), &session(), &mode, fixed_time())
                .await
                .unwrap();
            let name = path.file_name().unwrap().to_str().unwrap().to_string();
            assert!(!name.chars().any(|c| ILLEGAL_FILENAME_CHARS.contains(&c)));
            assert!(names.insert(name));
        }
        assert!(names.contains("Ryu-Dev-12345-2025-01-31_08-05-09-2.json"));
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let exporter = ConversationExporter::new(blocker.join("conversation"), 20);
        let mode = Mode::new("deepseek-chat", 1.3);
        let err = exporter
            .export(&private_chat(), &session(), &mode)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::CreateDir { .. }));
    }
}
