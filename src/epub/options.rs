//! Reader and writer configuration.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// `playOrder` numbering for NCX navigation points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlayOrder {
    pub enabled: bool,
    pub start_from: usize,
}

impl Default for PlayOrder {
    fn default() -> Self {
        Self {
            enabled: false,
            start_from: 1,
        }
    }
}

/// Configuration for writing a package.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WriteOptions {
    /// Emit the legacy `<guide>` block.
    pub epub2_guide: bool,
    /// Emit a landmarks `<nav>` mirroring the guide.
    pub epub3_landmark: bool,
    /// Emit a page-list `<nav>` built from page-break markers.
    pub epub3_pages: bool,
    pub landmark_title: String,
    pub pages_title: String,
    /// Write the book direction as the spine's `page-progression-direction`.
    pub spine_direction: bool,
    /// Write the book direction as the package `dir` attribute.
    pub package_direction: bool,
    pub play_order: PlayOrder,
    /// Return write failures as errors instead of `Ok(false)`.
    pub raise_exceptions: bool,
    /// Deflate level (0-9); `None` uses the archive library default.
    pub compression_level: Option<i64>,
    /// Fixed `dcterms:modified` value; the current time when unset.
    pub modified: Option<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            epub2_guide: true,
            epub3_landmark: true,
            epub3_pages: true,
            landmark_title: "Guide".into(),
            pages_title: "Pages".into(),
            spine_direction: true,
            package_direction: false,
            play_order: PlayOrder::default(),
            raise_exceptions: false,
            compression_level: None,
            modified: None,
        }
    }
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_epub2_guide(mut self, enabled: bool) -> Self {
        self.epub2_guide = enabled;
        self
    }

    pub fn with_landmarks(mut self, enabled: bool) -> Self {
        self.epub3_landmark = enabled;
        self
    }

    pub fn with_page_list(mut self, enabled: bool) -> Self {
        self.epub3_pages = enabled;
        self
    }

    pub fn with_landmark_title(mut self, title: impl Into<String>) -> Self {
        self.landmark_title = title.into();
        self
    }

    pub fn with_pages_title(mut self, title: impl Into<String>) -> Self {
        self.pages_title = title.into();
        self
    }

    pub fn with_spine_direction(mut self, enabled: bool) -> Self {
        self.spine_direction = enabled;
        self
    }

    pub fn with_package_direction(mut self, enabled: bool) -> Self {
        self.package_direction = enabled;
        self
    }

    /// Number NCX navigation points starting at `start_from`.
    pub fn with_play_order(mut self, start_from: usize) -> Self {
        self.play_order = PlayOrder {
            enabled: true,
            start_from,
        };
        self
    }

    pub fn with_raise_exceptions(mut self, raise: bool) -> Self {
        self.raise_exceptions = raise;
        self
    }

    pub fn with_compression_level(mut self, level: i64) -> Self {
        self.compression_level = Some(level);
        self
    }

    pub fn with_modified(mut self, timestamp: impl Into<String>) -> Self {
        self.modified = Some(timestamp.into());
        self
    }
}

/// Configuration for reading a package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReadOptions {
    /// Skip the NCX and rebuild the table of contents from the nav document.
    pub ignore_ncx: bool,
    /// Reject archives whose total uncompressed size exceeds this many bytes.
    pub max_archive_size: Option<u64>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore_ncx(mut self, ignore: bool) -> Self {
        self.ignore_ncx = ignore;
        self
    }

    pub fn with_max_archive_size(mut self, bytes: u64) -> Self {
        self.max_archive_size = Some(bytes);
        self
    }
}
