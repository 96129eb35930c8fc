use crate::error::{Error, ErrorKind};
use derive_more::Display;
use std::str::FromStr;

/// Media types with their own file and placement tables.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    #[display("image")]
    Image,
    #[display("audio")]
    Audio,
}
impl MediaType {
    pub const ALL: [MediaType; 2] = [MediaType::Image, MediaType::Audio];

    pub(crate) const fn placement_table(&self) -> &'static str {
        match self {
            Self::Image => "mm_files_image_storage",
            Self::Audio => "mm_files_audio_storage",
        }
    }
}
impl FromStr for MediaType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            _ => exn::bail!(ErrorKind::InvalidData("media type")),
        }
    }
}

/// Encoding of an object held by a placement.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Representation {
    /// As captured in the field.
    #[display("original")]
    Original = 0,
    /// Downsampled and re-encoded.
    #[display("scaled")]
    Scaled = 1,
    /// Losslessly recompressed.
    #[display("repacked")]
    Repacked = 2,
}
impl Representation {
    /// File extension objects of this representation are stored with, or
    /// `None` if the original name is kept.
    pub const fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Scaled => Some("jpg"),
            Self::Original | Self::Repacked => None,
        }
    }

    /// Object name of this representation, derived from the original's.
    ///
    /// ```
    /// use mediashift_catalog::Representation;
    /// assert_eq!(Representation::Scaled.object_name("2019/IMG_0001.PNG"), "2019/IMG_0001.jpg");
    /// assert_eq!(Representation::Scaled.object_name("2019/README"), "2019/README.jpg");
    /// assert_eq!(Representation::Original.object_name("2019/IMG_0001.PNG"), "2019/IMG_0001.PNG");
    /// ```
    pub fn object_name(&self, original: &str) -> String {
        let Some(extension) = self.extension() else {
            return original.to_string();
        };
        let file_start = original.rfind('/').map_or(0, |i| i + 1);
        let stem = match original[file_start..].rfind('.') {
            // A leading dot is a hidden file, not an extension.
            Some(dot) if dot > 0 => &original[..file_start + dot],
            _ => original,
        };
        format!("{stem}.{extension}")
    }
}
impl From<Representation> for i64 {
    fn from(value: Representation) -> Self {
        value as i64
    }
}
impl TryFrom<i64> for Representation {
    type Error = Error;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Original),
            1 => Ok(Self::Scaled),
            2 => Ok(Self::Repacked),
            _ => exn::bail!(ErrorKind::InvalidData("representation type")),
        }
    }
}
