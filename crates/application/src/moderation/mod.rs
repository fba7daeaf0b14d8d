//! 内容审核
//!
//! 纯函数的内容分析器，以及带超时和本地兜底的安抚回复生成。

pub mod analyzer;
pub mod soothing;

pub use analyzer::{AnalyzerError, ContentAnalyzer};
pub use soothing::{ReplyError, ReplyGenerator, SoothingReplies};
