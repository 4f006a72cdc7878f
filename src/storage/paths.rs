//! bucket 内的图片路径约定
//!
//! - 字母：`{L}/{L}_{NN}.png`
//! - 特殊符号：`_Special Characters/{type}_Sign_{NN}.png`
//! - 形状：`_Shapes/{type}_{NN}.png`
//! - 文字贴纸：`_Words/{word}.png`

/// 字母图片路径，样式编号补零到两位。
pub fn letter_path(letter: char, style: u8) -> String {
    format!("{letter}/{letter}_{style:02}.png")
}

pub fn special_char_path(kind: &str, variant: u8) -> String {
    format!("_Special Characters/{kind}_Sign_{variant:02}.png")
}

pub fn shape_path(kind: &str, variant: u8) -> String {
    format!("_Shapes/{kind}_{variant:02}.png")
}

pub fn word_path(word: &str) -> String {
    format!("_Words/{word}.png")
}

/// 依据扩展名推断上传时的 Content-Type
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}
