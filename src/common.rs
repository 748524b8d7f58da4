use core::fmt;

/// Largest canvas width accepted unless the decoder is configured otherwise.
pub const DEFAULT_MAX_WIDTH: u16 = 800;
/// Largest canvas height accepted unless the decoder is configured otherwise.
pub const DEFAULT_MAX_HEIGHT: u16 = 600;

/// Known GIF block labels.
///
/// Note that the block uniquely specifies the layout of bytes that follow and how they are
/// framed. For example, the header always has a fixed length but is followed by a variable amount
/// of additional data. An image descriptor may be followed by a local color table depending on
/// information read in it. Therefore, it doesn't make sense to continue parsing after encountering
/// an unknown block as the semantics of following bytes are unclear.
///
/// The extension block provides a common framing for an arbitrary amount of application specific
/// data which may be ignored.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Block {
    /// Image block.
    Image = 0x2C,
    /// Extension block.
    Extension = 0x21,
    /// Image trailer.
    Trailer = 0x3B,
}

impl Block {
    /// Try to parse from u8
    pub fn from_u8(n: u8) -> Result<Self, GifError> {
        match n {
            0x2C => Ok(Block::Image),
            0x21 => Ok(Block::Extension),
            0x3B => Ok(Block::Trailer),
            _ => Err(GifError::DecodeError),
        }
    }
}

/// Known GIF Extension labels.
///
/// Only the graphics control and application extensions carry anything we act on; the rest are
/// recognised so their sub-block chains can be skipped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtensionLabel {
    /// Graphics control extension.
    Graphics,
    /// Application extension (looping information lives here).
    App,
    /// Plain text extension.
    Text,
    /// Comment extension
    Comment,
    /// Anything else; framed like every other extension.
    Unknown(u8),
}

impl ExtensionLabel {
    pub fn from_u8(n: u8) -> Self {
        match n {
            0xf9 => ExtensionLabel::Graphics,
            0xff => ExtensionLabel::App,
            0x01 => ExtensionLabel::Text,
            0xfe => ExtensionLabel::Comment,
            other => ExtensionLabel::Unknown(other),
        }
    }
}

/// What happens to a frame's area once the frame's display time is over.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisposalMethod {
    /// No disposal specified; the frame is left in place.
    #[default]
    None,
    /// Do not dispose; the frame is left in place.
    Keep,
    /// Overwrite the frame's rectangle with the background color.
    RestoreBackground,
    /// Restore the canvas as it was before the frame was drawn.
    RestorePrevious,
}

impl DisposalMethod {
    /// Decode the 3 bit disposal field of a graphics control extension. Reserved values are
    /// treated as "not specified".
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x7 {
            1 => DisposalMethod::Keep,
            2 => DisposalMethod::RestoreBackground,
            3 => DisposalMethod::RestorePrevious,
            _ => DisposalMethod::None,
        }
    }
}

/// Errors that emerge when loading or playing back a gif
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GifError {
    /// Decoding the image data failed; an LZW code or a block was inconsistent
    DecodeError,
    /// Canvas is larger than the configured maximum
    FileTooWide,
    /// Empty input, or an operation that needs a loaded stream was called without one
    InvalidParameter,
    /// The stream uses something we can't decode
    UnsupportedFeature,
    /// The byte reader could not provide the header
    FileNotFound,
    /// EoF came early
    EarlyEof,
    /// No images left
    EmptyFrame,
    /// Signature is neither GIF87a nor GIF89a
    BadFileFormat,
    /// An allocation for raw data or canvas buffers failed
    OutOfMemory,
    /// A display size is needed but was never set
    DisplayNotSet,
    /// Catch-all for codes we don't know about
    UnknownError,
}

impl GifError {
    const ALL: [GifError; 11] = [
        GifError::DecodeError,
        GifError::FileTooWide,
        GifError::InvalidParameter,
        GifError::UnsupportedFeature,
        GifError::FileNotFound,
        GifError::EarlyEof,
        GifError::EmptyFrame,
        GifError::BadFileFormat,
        GifError::OutOfMemory,
        GifError::DisplayNotSet,
        GifError::UnknownError,
    ];

    /// Human readable description of the error.
    pub const fn message(self) -> &'static str {
        match self {
            GifError::DecodeError => "Decode error",
            GifError::FileTooWide => "File too wide",
            GifError::InvalidParameter => "Invalid parameter",
            GifError::UnsupportedFeature => "Unsupported feature",
            GifError::FileNotFound => "File not found",
            GifError::EarlyEof => "Early end of file",
            GifError::EmptyFrame => "Empty frame",
            GifError::BadFileFormat => "Bad file format",
            GifError::OutOfMemory => "Out of memory",
            GifError::DisplayNotSet => "Display not set",
            GifError::UnknownError => "Unknown error",
        }
    }

    /// Stable numeric code. `0` is reserved for success.
    pub fn code(self) -> u8 {
        Self::ALL
            .iter()
            .position(|e| *e == self)
            .map_or(u8::MAX, |idx| idx as u8 + 1)
    }

    /// Inverse of [`GifError::code`]. `0` means success; codes we don't know map to
    /// [`GifError::UnknownError`].
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            n => Some(
                Self::ALL
                    .get(n as usize - 1)
                    .copied()
                    .unwrap_or(GifError::UnknownError),
            ),
        }
    }
}

impl fmt::Display for GifError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for GifError {}
