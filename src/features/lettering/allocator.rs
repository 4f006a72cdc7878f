use std::collections::{BTreeSet, HashMap};

use rand::Rng;

use super::models::{Letter, StyleIndex};

/// 样式占用记录：每个字母试过的样式 + 当前页面上出现过的全部样式。
///
/// 作为值在 `allocate` 调用间显式传递，不存在隐藏的共享可变状态。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleAllocatorState {
    used_by_letter: HashMap<Letter, BTreeSet<StyleIndex>>,
    global_used: BTreeSet<StyleIndex>,
}

impl StyleAllocatorState {
    pub fn used_for(&self, letter: Letter) -> Option<&BTreeSet<StyleIndex>> {
        self.used_by_letter.get(&letter)
    }

    pub fn global_used(&self) -> &BTreeSet<StyleIndex> {
        &self.global_used
    }

    fn is_free_for(&self, letter: Letter, style: StyleIndex) -> bool {
        !self.global_used.contains(&style)
            && !self
                .used_by_letter
                .get(&letter)
                .is_some_and(|used| used.contains(&style))
    }

    /// 记录已显示在页面上的样式，不做去重（重新生成使用）
    pub(super) fn mark_shown(&mut self, style: StyleIndex) {
        self.global_used.insert(style);
    }

    fn record(&mut self, letter: Letter, style: StyleIndex) {
        self.used_by_letter.entry(letter).or_default().insert(style);
        self.global_used.insert(style);
    }
}

/// 样式分配器：尽量避免同一字母重复、尽量避免整页重复。
#[derive(Debug, Clone, Copy)]
pub struct StyleAllocator {
    max_styles: StyleIndex,
}

impl Default for StyleAllocator {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_STYLES)
    }
}

impl StyleAllocator {
    pub const DEFAULT_MAX_STYLES: StyleIndex = 55;

    pub fn new(max_styles: StyleIndex) -> Self {
        Self {
            max_styles: max_styles.max(1),
        }
    }

    pub fn max_styles(&self) -> StyleIndex {
        self.max_styles
    }

    /// 为 `letter` 分配样式，返回样式与更新后的状态。
    ///
    /// 最多随机抽取 `max_styles` 次；都冲突时清空该字母的记录，
    /// 线性扫描第一个全局未用的样式，仍没有则退回 1。总会终止。
    pub fn allocate<R: Rng + ?Sized>(
        &self,
        mut state: StyleAllocatorState,
        letter: Letter,
        rng: &mut R,
    ) -> (StyleIndex, StyleAllocatorState) {
        let drawn = (0..self.max_styles)
            .map(|_| self.random_style(rng))
            .find(|&style| state.is_free_for(letter, style));

        let style = match drawn {
            Some(style) => style,
            None => {
                state.used_by_letter.remove(&letter);
                (1..=self.max_styles)
                    .find(|style| !state.global_used.contains(style))
                    .unwrap_or(1)
            }
        };

        state.record(letter, style);
        (style, state)
    }

    /// 不做任何去重的均匀随机样式（重新生成与标题使用）
    pub fn random_style<R: Rng + ?Sized>(&self, rng: &mut R) -> StyleIndex {
        rng.gen_range(1..=self.max_styles)
    }
}
