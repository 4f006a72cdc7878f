use std::fmt;

use serde::{Deserialize, Serialize};

/// 样式编号（1..=max_styles）
pub type StyleIndex = u8;

/// 可渲染为图片的字符：`A-Z` 与 `0-9`（已大写）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Letter(char);

impl Letter {
    pub fn new(c: char) -> Option<Self> {
        (c.is_ascii_uppercase() || c.is_ascii_digit()).then_some(Self(c))
    }

    pub fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Letter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 单个渲染指令，顺序与输入字符一一对应
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RenderDirective {
    /// 空格
    Space,
    /// 不支持的字符，原样展示
    #[serde(rename = "invalid")]
    InvalidChar {
        #[serde(rename = "char")]
        #[schema(value_type = String, example = "@")]
        ch: char,
    },
    /// 字母图片；存储未配置时 `image` 为 null
    Letter {
        #[serde(rename = "char")]
        #[schema(value_type = String, example = "A")]
        ch: char,
        #[schema(example = 7)]
        style: StyleIndex,
        #[schema(example = "https://demo.supabase.co/storage/v1/object/public/images/A/A_07.png")]
        image: Option<String>,
    },
}

impl RenderDirective {
    pub fn letter(&self) -> Option<Letter> {
        match self {
            RenderDirective::Letter { ch, .. } => Letter::new(*ch),
            _ => None,
        }
    }

    pub fn image(&self) -> Option<&str> {
        match self {
            RenderDirective::Letter { image, .. } => image.as_deref(),
            _ => None,
        }
    }
}

/// 字母图片的加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    Pending,
    Loaded,
    Failed,
}

/// 带位置与加载状态的渲染指令
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DirectiveView {
    /// 在整个序列中的 0 基位置
    pub position: usize,
    pub directive: RenderDirective,
    /// 仅字母指令有值
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LoadStatus>,
}

/// 会话当前的渲染结果
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    #[schema(example = "ls_3f1c0a4e9b7d4c51a2f8e6d0b9c7a1e2")]
    pub session_id: String,
    /// 最近一次渲染的原始文本
    pub text: String,
    /// 渲染代数，每次 render/regenerate 递增
    pub generation: u64,
    /// 是否仍有图片在预加载
    pub loading: bool,
    pub directives: Vec<DirectiveView>,
}
