use rand::Rng;
use serde::Serialize;

use crate::storage::UrlResolver;
use crate::storage::paths::{shape_path, special_char_path, word_path};

/// 特殊符号：类型与可用变体数
pub const SPECIAL_CHARS: &[(&str, u8)] = &[
    ("exclamation", 8),
    ("question", 16),
    ("dollar", 10),
    ("percent", 11),
    ("plus", 5),
    ("equals", 3),
    ("number", 6),
    ("yen", 3),
    ("trademark", 4),
    ("tilde", 4),
    ("slash", 5),
    ("semicolon", 6),
    ("registered_trademark", 3),
    ("quotation_mark", 7),
    ("pound", 3),
    ("parenthesis", 6),
    ("euro", 4),
    ("ellipsis", 3),
];

pub const SHAPES: &[(&str, u8)] = &[
    ("star", 2),
    ("flash", 2),
    ("arrow", 18),
    ("emoji", 4),
    ("skull", 1),
];

pub const WORDS: &[&str] = &[
    "WOW", "Super", "Cool", "Hot", "New", "Free", "Best", "Amazing", "Premium", "Special", "Sexy",
    "Sale", "Out_Now", "Only", "OMG", "OFF", "Fresh", "Exclusive", "Biggest",
];

const WORD_PROBABILITY: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum DecorKind {
    SpecialChar,
    Shape,
    Word,
}

/// 一个背景装饰元素
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DecorElement {
    #[schema(example = "char-dollar-0")]
    pub id: String,
    pub kind: DecorKind,
    /// 符号/形状类型或单词
    #[schema(example = "dollar")]
    pub name: String,
    /// 存储未配置时为 null
    pub image: Option<String>,
    /// 0..100
    pub top_pct: f64,
    /// 0..100
    pub left_pct: f64,
    /// 0..360
    pub rotate_deg: f64,
    /// 0.5..1.0
    pub scale: f64,
    /// 渐显延迟（秒），0..5
    pub delay_secs: f64,
}

/// 随机生成一组背景装饰：每种符号和形状 1-2 个，每个单词 30% 概率出现一次。
pub fn generate_layout<R: Rng + ?Sized>(
    resolver: &dyn UrlResolver,
    rng: &mut R,
) -> Vec<DecorElement> {
    let mut elements = Vec::new();

    for &(kind, count) in SPECIAL_CHARS {
        for i in 0..rng.gen_range(1..=2) {
            let path = special_char_path(kind, rng.gen_range(1..=count));
            elements.push(place(
                format!("char-{kind}-{i}"),
                DecorKind::SpecialChar,
                kind,
                resolver.resolve(&path),
                rng,
            ));
        }
    }

    for &(kind, count) in SHAPES {
        for i in 0..rng.gen_range(1..=2) {
            let path = shape_path(kind, rng.gen_range(1..=count));
            elements.push(place(
                format!("shape-{kind}-{i}"),
                DecorKind::Shape,
                kind,
                resolver.resolve(&path),
                rng,
            ));
        }
    }

    for &word in WORDS {
        if rng.gen_bool(WORD_PROBABILITY) {
            elements.push(place(
                format!("word-{word}"),
                DecorKind::Word,
                word,
                resolver.resolve(&word_path(word)),
                rng,
            ));
        }
    }

    elements
}

fn place<R: Rng + ?Sized>(
    id: String,
    kind: DecorKind,
    name: &str,
    image: Option<String>,
    rng: &mut R,
) -> DecorElement {
    DecorElement {
        id,
        kind,
        name: name.to_string(),
        image,
        top_pct: rng.gen_range(0.0..100.0),
        left_pct: rng.gen_range(0.0..100.0),
        rotate_deg: rng.gen_range(0.0..360.0),
        scale: rng.gen_range(0.5..1.0),
        delay_secs: rng.gen_range(0.0..5.0),
    }
}

#[cfg(test)]
mod tests {
    use super::{DecorKind, SHAPES, SPECIAL_CHARS, WORDS, generate_layout};
    use crate::test_support::{NullResolver, PrefixResolver};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn every_symbol_and_shape_appears_once_or_twice() {
        let mut rng = StdRng::seed_from_u64(5);
        let layout = generate_layout(&PrefixResolver("http://img"), &mut rng);

        for &(kind, _) in SPECIAL_CHARS {
            let n = layout
                .iter()
                .filter(|e| e.kind == DecorKind::SpecialChar && e.name == kind)
                .count();
            assert!((1..=2).contains(&n), "{kind}: {n}");
        }
        for &(kind, _) in SHAPES {
            let n = layout
                .iter()
                .filter(|e| e.kind == DecorKind::Shape && e.name == kind)
                .count();
            assert!((1..=2).contains(&n), "{kind}: {n}");
        }
        assert!(layout.iter().filter(|e| e.kind == DecorKind::Word).count() <= WORDS.len());
    }

    #[test]
    fn placement_ranges_and_paths() {
        let mut rng = StdRng::seed_from_u64(6);
        let layout = generate_layout(&PrefixResolver("http://img"), &mut rng);
        for e in &layout {
            assert!((0.0..100.0).contains(&e.top_pct));
            assert!((0.0..100.0).contains(&e.left_pct));
            assert!((0.0..360.0).contains(&e.rotate_deg));
            assert!((0.5..1.0).contains(&e.scale));
            assert!((0.0..5.0).contains(&e.delay_secs));
            let image = e.image.as_deref().expect("resolved");
            match e.kind {
                DecorKind::SpecialChar => {
                    assert!(image.starts_with("http://img/_Special Characters/"))
                }
                DecorKind::Shape => assert!(image.starts_with("http://img/_Shapes/")),
                DecorKind::Word => assert_eq!(image, format!("http://img/_Words/{}.png", e.name)),
            }
        }
    }

    #[test]
    fn unconfigured_storage_yields_no_images() {
        let mut rng = StdRng::seed_from_u64(7);
        let layout = generate_layout(&NullResolver, &mut rng);
        assert!(!layout.is_empty());
        assert!(layout.iter().all(|e| e.image.is_none()));
    }
}
