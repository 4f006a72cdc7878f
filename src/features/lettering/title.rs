use rand::Rng;
use serde::Serialize;

use super::models::{Letter, RenderDirective};
use super::renderer::TextRenderer;

/// 页面标题的固定样式表（每个位置一个样式，0 表示空格）
const FIXED_TITLE: [&[(char, u8)]; 2] = [
    &[
        ('R', 9),
        ('A', 2),
        ('N', 5),
        ('S', 4),
        ('O', 5),
        ('M', 6),
        ('E', 8),
        (' ', 0),
        ('T', 16),
        ('E', 12),
        ('X', 9),
        ('T', 16),
    ],
    &[
        ('G', 11),
        ('E', 12),
        ('N', 19),
        ('E', 12),
        ('R', 18),
        ('A', 12),
        ('T', 16),
        ('O', 17),
        ('R', 18),
    ],
];

const RANDOM_TITLE: &str = "NAME ART GENERATOR";

/// 标题字母，按行分组
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct TitleLettering {
    pub lines: Vec<Vec<RenderDirective>>,
}

/// 固定样式的标题
pub fn fixed_title(renderer: &TextRenderer) -> TitleLettering {
    let lines = FIXED_TITLE
        .iter()
        .map(|line| {
            line.iter()
                .map(|&(c, style)| match Letter::new(c) {
                    Some(letter) => renderer.letter_directive(letter, style),
                    None => RenderDirective::Space,
                })
                .collect()
        })
        .collect();
    TitleLettering { lines }
}

/// 每个字母随机样式的标题（允许重复）
pub fn random_title<R: Rng + ?Sized>(renderer: &TextRenderer, rng: &mut R) -> TitleLettering {
    let line = RANDOM_TITLE
        .chars()
        .map(|c| match Letter::new(c) {
            Some(letter) => {
                let style = renderer.allocator().random_style(rng);
                renderer.letter_directive(letter, style)
            }
            None => RenderDirective::Space,
        })
        .collect();
    TitleLettering { lines: vec![line] }
}
