use std::fmt;
use std::path::Path;

use thiserror::Error;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Kind implied by a (case-insensitive) extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else {
            None
        }
    }
}

/// The two uploads compared by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Real,
    Fake,
}

impl Role {
    /// Multipart field name.
    pub fn field(self) -> &'static str {
        match self {
            Role::Real => "realMedia",
            Role::Fake => "fakeMedia",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Real => "real",
            Role::Fake => "fake",
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Both realMedia and fakeMedia files are required")]
    MissingField(&'static str),

    #[error("{0} has no file name")]
    MissingFileName(&'static str),

    #[error("{field}: unsupported file type {file_name:?}, allowed: png, jpg, jpeg, mp4, avi, mov")]
    UnsupportedExtension {
        field: &'static str,
        file_name: String,
    },

    #[error("Files must be less than {limit} bytes ({field} is {size} bytes)")]
    TooLarge {
        field: &'static str,
        size: usize,
        limit: usize,
    },

    #[error("Files must be less than {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("malformed multipart form: {0}")]
    MalformedForm(String),
}

impl ValidationError {
    /// Short title used as the `error` member of a response.
    pub fn title(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "Missing files",
            ValidationError::TooLarge { .. } | ValidationError::BodyTooLarge { .. } => {
                "File too large"
            }
            ValidationError::UnsupportedExtension { .. } => "Unsupported file type",
            ValidationError::MissingFileName(_) | ValidationError::MalformedForm(_) => {
                "Invalid upload"
            }
        }
    }
}

/// An uploaded file as received.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub contents: Vec<u8>,
}

/// An upload that passed validation.
#[derive(Debug, Clone)]
pub struct MediaInput {
    pub role: Role,
    pub kind: MediaKind,
    pub file_name: String,
    /// Lower-cased extension, used for the stored file.
    pub extension: String,
    pub contents: Vec<u8>,
}

impl MediaInput {
    pub fn size(&self) -> usize {
        self.contents.len()
    }

    /// Check presence, size and extension of one upload.
    pub fn validate(
        role: Role,
        upload: Option<Upload>,
        max_bytes: usize,
    ) -> Result<Self, ValidationError> {
        let field = role.field();
        let upload = upload.ok_or(ValidationError::MissingField(field))?;

        let file_name = upload
            .file_name
            .filter(|n| !n.trim().is_empty())
            .ok_or(ValidationError::MissingFileName(field))?;

        if upload.contents.len() > max_bytes {
            return Err(ValidationError::TooLarge {
                field,
                size: upload.contents.len(),
                limit: max_bytes,
            });
        }

        let unsupported = || ValidationError::UnsupportedExtension {
            field,
            file_name: file_name.clone(),
        };
        let extension = Path::new(&file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .ok_or_else(unsupported)?;
        let kind = MediaKind::from_extension(&extension).ok_or_else(unsupported)?;

        Ok(Self {
            role,
            kind,
            file_name,
            extension,
            contents: upload.contents,
        })
    }
}
