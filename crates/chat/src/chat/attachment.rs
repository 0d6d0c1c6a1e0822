use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

/// Largest accepted file, in bytes (10 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;
const OCTET_STREAM: &str = "application/octet-stream";

const ACCEPTED_MIME_TYPES: [&str; 6] = [
    "text/plain",
    "text/markdown",
    "text/x-markdown",
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(pub Uuid);

impl AttachmentId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Where the raw bytes of a selected file live. Transport is out of scope, so the
/// handle is carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHandle {
    Path(PathBuf),
    Inline(Arc<[u8]>),
}

/// A file as handed over by a drop or a file picker, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub name: String,
    pub size_bytes: u64,
    /// Browser-reported type; may be missing or generic.
    pub mime_type: Option<String>,
    pub content: ContentHandle,
}

impl FileCandidate {
    pub fn new(name: impl Into<String>, size_bytes: u64, content: ContentHandle) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: None,
            content,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub content: ContentHandle,
}

impl Attachment {
    pub fn display_size(&self) -> String {
        format_file_size(self.size_bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    TooLarge { size_bytes: u64, limit: u64 },
    UnsupportedType { mime_type: String },
}

/// A file that did not pass intake, with the reason shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub name: String,
    pub reason: RejectionReason,
}

impl fmt::Display for Rejection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            RejectionReason::TooLarge { size_bytes, limit } => write!(
                formatter,
                "{} is too large ({}); the limit is {}",
                self.name,
                format_file_size(*size_bytes),
                format_file_size(*limit)
            ),
            RejectionReason::UnsupportedType { mime_type } => write!(
                formatter,
                "{} has an unsupported file type ({mime_type})",
                self.name
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeReport {
    pub accepted: Vec<Attachment>,
    pub rejected: Vec<Rejection>,
}

/// Validates dropped or selected files against the type whitelist and size limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentIntake {
    max_bytes: u64,
}

impl Default for AttachmentIntake {
    fn default() -> Self {
        Self::new(MAX_ATTACHMENT_BYTES)
    }
}

impl AttachmentIntake {
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn intake(&self, candidates: impl IntoIterator<Item = FileCandidate>) -> IntakeReport {
        let mut report = IntakeReport::default();

        for candidate in candidates {
            match self.check(candidate) {
                Ok(attachment) => report.accepted.push(attachment),
                Err(rejection) => {
                    tracing::info!(
                        file = %rejection.name,
                        reason = ?rejection.reason,
                        "attachment rejected"
                    );
                    report.rejected.push(rejection);
                }
            }
        }

        report
    }

    fn check(&self, candidate: FileCandidate) -> Result<Attachment, Rejection> {
        let mime_type = resolve_mime_type(&candidate);

        if !Self::accepts_mime(&mime_type) {
            return Err(Rejection {
                name: candidate.name,
                reason: RejectionReason::UnsupportedType { mime_type },
            });
        }

        if candidate.size_bytes > self.max_bytes {
            return Err(Rejection {
                name: candidate.name,
                reason: RejectionReason::TooLarge {
                    size_bytes: candidate.size_bytes,
                    limit: self.max_bytes,
                },
            });
        }

        Ok(Attachment {
            id: AttachmentId::new_v4(),
            name: candidate.name,
            size_bytes: candidate.size_bytes,
            mime_type,
            content: candidate.content,
        })
    }

    /// Plain text, markdown, PDF, Word (legacy and OOXML) and any image subtype.
    pub fn accepts_mime(mime_type: &str) -> bool {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if let Some(subtype) = essence.strip_prefix("image/") {
            return !subtype.is_empty();
        }

        ACCEPTED_MIME_TYPES.contains(&essence.as_str())
    }
}

fn resolve_mime_type(candidate: &FileCandidate) -> String {
    if let Some(declared) = candidate.mime_type.as_deref().map(str::trim)
        && !declared.is_empty()
        && !declared.eq_ignore_ascii_case(OCTET_STREAM)
    {
        return declared.to_string();
    }

    let path = Path::new(&candidate.name);
    let is_markdown = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            extension.eq_ignore_ascii_case("md") || extension.eq_ignore_ascii_case("markdown")
        });
    if is_markdown {
        return "text/markdown".to_string();
    }

    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

/// Files waiting to be sent with the next message.
#[derive(Debug, Clone, Default)]
pub struct PendingAttachments {
    items: Vec<Attachment>,
}

impl PendingAttachments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, attachments: impl IntoIterator<Item = Attachment>) {
        self.items.extend(attachments);
    }

    pub fn remove(&mut self, id: AttachmentId) -> Option<Attachment> {
        let position = self.items.iter().position(|item| item.id == id)?;
        Some(self.items.remove(position))
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attachment> {
        self.items.iter()
    }

    pub fn to_vec(&self) -> Vec<Attachment> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.items.iter().map(|item| item.name.clone()).collect()
    }
}

/// Fallback user-message text when only files were sent.
pub fn describe_attachments(count: usize) -> String {
    format!("Uploaded {count} file(s)")
}

/// Human-readable size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["Bytes", "KB", "MB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut divisor = 1u64;
    while unit + 1 < UNITS.len() && bytes >= divisor * 1024 {
        divisor *= 1024;
        unit += 1;
    }

    let scaled = ((bytes as f64 / divisor as f64) * 100.0).round() / 100.0;
    format!("{scaled} {}", UNITS[unit])
}
