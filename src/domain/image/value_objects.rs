//! Image Context - Value Objects

use serde::{Deserialize, Serialize};

use super::OptionError;

/// 合成背景色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum BackgroundColor {
    /// 保留透明通道
    Transparent,
    #[default]
    White,
    Black,
}

impl BackgroundColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundColor::Transparent => "transparent",
            BackgroundColor::White => "white",
            BackgroundColor::Black => "black",
        }
    }

    /// 不透明背景的 RGB 值，透明背景返回 None
    pub fn rgb(&self) -> Option<[u8; 3]> {
        match self {
            BackgroundColor::Transparent => None,
            BackgroundColor::White => Some([255, 255, 255]),
            BackgroundColor::Black => Some([0, 0, 0]),
        }
    }
}

impl std::fmt::Display for BackgroundColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackgroundColor {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transparent" => Ok(BackgroundColor::Transparent),
            "white" => Ok(BackgroundColor::White),
            "black" => Ok(BackgroundColor::Black),
            _ => Err(OptionError::InvalidBackgroundColor(s.to_string())),
        }
    }
}

impl TryFrom<String> for BackgroundColor {
    type Error = OptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 输出编码格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum OutputFormat {
    Png,
    #[default]
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Png => "PNG",
            OutputFormat::Jpeg => "JPEG",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn supports_alpha(&self) -> bool {
        matches!(self, OutputFormat::Png)
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PNG" => Ok(OutputFormat::Png),
            "JPEG" | "JPG" => Ok(OutputFormat::Jpeg),
            _ => Err(OptionError::InvalidOutputFormat(s.to_string())),
        }
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = OptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 水印选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum Watermark {
    #[default]
    None,
    Applied,
}

impl Watermark {
    pub fn as_str(&self) -> &'static str {
        match self {
            Watermark::None => "none",
            Watermark::Applied => "applied",
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Watermark::Applied)
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Watermark {
    type Err = OptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" | "" => Ok(Watermark::None),
            // 旧版前端发送 "blog"
            "applied" | "blog" => Ok(Watermark::Applied),
            _ => Err(OptionError::InvalidWatermark(s.to_string())),
        }
    }
}

impl TryFrom<String> for Watermark {
    type Error = OptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// 单个任务的处理选项
///
/// 任务创建时从会话配置拷贝，之后的重新配置不影响已入队的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessingOptions {
    pub background: BackgroundColor,
    pub format: OutputFormat,
    pub watermark: Watermark,
}

impl ProcessingOptions {
    pub fn new(background: BackgroundColor, format: OutputFormat, watermark: Watermark) -> Self {
        Self {
            background,
            format,
            watermark,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("WHITE".parse::<BackgroundColor>(), Ok(BackgroundColor::White));
        assert_eq!("png".parse::<OutputFormat>(), Ok(OutputFormat::Png));
        assert_eq!("jpg".parse::<OutputFormat>(), Ok(OutputFormat::Jpeg));
        assert_eq!("Blog".parse::<Watermark>(), Ok(Watermark::Applied));
    }

    #[test]
    fn test_parse_rejects_unknown_values() {
        assert!("red".parse::<BackgroundColor>().is_err());
        assert!("webp".parse::<OutputFormat>().is_err());
        assert!("logo".parse::<Watermark>().is_err());
    }

    #[test]
    fn test_serde_round_trip_uses_wire_names() {
        let json = serde_json::to_string(&OutputFormat::Jpeg).unwrap();
        assert_eq!(json, "\"JPEG\"");

        let bg: BackgroundColor = serde_json::from_str("\"Transparent\"").unwrap();
        assert_eq!(bg, BackgroundColor::Transparent);
        assert!(serde_json::from_str::<BackgroundColor>("\"green\"").is_err());
    }

    #[test]
    fn test_format_properties() {
        assert_eq!(OutputFormat::Png.mime_type(), "image/png");
        assert_eq!(OutputFormat::Jpeg.extension(), "jpg");
        assert!(OutputFormat::Png.supports_alpha());
        assert!(!OutputFormat::Jpeg.supports_alpha());
        assert_eq!(BackgroundColor::Transparent.rgb(), None);
        assert_eq!(BackgroundColor::Black.rgb(), Some([0, 0, 0]));
    }
}
