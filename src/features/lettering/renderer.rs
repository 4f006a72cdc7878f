use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::storage::UrlResolver;
use crate::storage::paths::letter_path;

use super::allocator::{StyleAllocator, StyleAllocatorState};
use super::models::{Letter, RenderDirective, StyleIndex};

/// 字母 -> 当前样式，以及分配器的占用记录。随每次渲染传入并返回。
#[derive(Debug, Clone, Default)]
pub struct LetterStyles {
    pub assignment: HashMap<Letter, StyleIndex>,
    pub allocator: StyleAllocatorState,
}

/// 一次渲染的结果
#[derive(Debug, Clone)]
pub struct Rendered {
    pub directives: Vec<RenderDirective>,
    pub styles: LetterStyles,
}

/// 文本 -> 渲染指令序列
#[derive(Clone)]
pub struct TextRenderer {
    allocator: StyleAllocator,
    resolver: Arc<dyn UrlResolver>,
}

impl TextRenderer {
    pub fn new(allocator: StyleAllocator, resolver: Arc<dyn UrlResolver>) -> Self {
        Self {
            allocator,
            resolver,
        }
    }

    pub fn allocator(&self) -> &StyleAllocator {
        &self.allocator
    }

    /// 实时预览：已分配过样式的字母保持原样式，新字母通过分配器取样式。
    pub fn render<R: Rng + ?Sized>(
        &self,
        text: &str,
        mut styles: LetterStyles,
        rng: &mut R,
    ) -> Rendered {
        let directives = self.map_chars(text, |letter| match styles.assignment.get(&letter) {
            Some(&style) => style,
            None => {
                let state = std::mem::take(&mut styles.allocator);
                let (style, state) = self.allocator.allocate(state, letter, rng);
                styles.allocator = state;
                styles.assignment.insert(letter, style);
                style
            }
        });
        Rendered { directives, styles }
    }

    /// 重新生成：每个字母出现处都取一个不去重的随机样式，忽略已有分配。
    pub fn regenerate<R: Rng + ?Sized>(
        &self,
        text: &str,
        mut styles: LetterStyles,
        rng: &mut R,
    ) -> Rendered {
        let directives = self.map_chars(text, |letter| {
            let style = self.allocator.random_style(rng);
            styles.assignment.insert(letter, style);
            styles.allocator.mark_shown(style);
            style
        });
        Rendered { directives, styles }
    }

    /// 为加载失败的字母换一个样式（走分配器，而不是重试原样式）
    pub fn replacement<R: Rng + ?Sized>(
        &self,
        letter: Letter,
        styles: &mut LetterStyles,
        rng: &mut R,
    ) -> RenderDirective {
        let state = std::mem::take(&mut styles.allocator);
        let (style, state) = self.allocator.allocate(state, letter, rng);
        styles.allocator = state;
        self.letter_directive(letter, style)
    }

    pub fn letter_directive(&self, letter: Letter, style: StyleIndex) -> RenderDirective {
        RenderDirective::Letter {
            ch: letter.as_char(),
            style,
            image: self
                .resolver
                .resolve(&letter_path(letter.as_char(), style)),
        }
    }

    /// 按字符与样式重建外部传入的指令，丢弃其中的图片地址。
    /// 字母不受支持或样式越界时返回 None。
    pub fn rebuild(&self, directive: &RenderDirective) -> Option<RenderDirective> {
        match directive {
            RenderDirective::Letter { ch, style, .. } => {
                let letter = Letter::new(*ch)?;
                (1..=self.allocator.max_styles())
                    .contains(style)
                    .then(|| self.letter_directive(letter, *style))
            }
            other => Some(other.clone()),
        }
    }

    fn map_chars(
        &self,
        text: &str,
        mut style_for: impl FnMut(Letter) -> StyleIndex,
    ) -> Vec<RenderDirective> {
        text.chars()
            .map(|c| {
                let upper = to_upper_single(c);
                if upper == ' ' {
                    return RenderDirective::Space;
                }
                match Letter::new(upper) {
                    Some(letter) => self.letter_directive(letter, style_for(letter)),
                    None => RenderDirective::InvalidChar { ch: upper },
                }
            })
            .collect()
    }
}

// 大写后变成多个字符的（如 'ß'）保持原字符，保证输出长度与输入字符数一致
fn to_upper_single(c: char) -> char {
    let mut upper = c.to_uppercase();
    match (upper.next(), upper.next()) {
        (Some(u), None) => u,
        _ => c,
    }
}
