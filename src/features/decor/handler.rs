use axum::{Router, extract::State, response::Json, routing::get};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::state::AppState;

use super::overlay::{DecorElement, generate_layout};

#[utoipa::path(
    get,
    path = "/decor/layout",
    summary = "背景装饰布局",
    description = "随机生成背景装饰（特殊符号、形状、文字贴纸）的位置、旋转、缩放与渐显延迟。每次调用结果不同。",
    responses((status = 200, description = "装饰元素列表", body = [DecorElement])),
    tag = "Decor"
)]
pub async fn get_layout(State(state): State<AppState>) -> Json<Vec<DecorElement>> {
    let mut rng = StdRng::from_entropy();
    Json(generate_layout(state.storage.as_ref(), &mut rng))
}

pub fn create_decor_router() -> Router<AppState> {
    Router::new().route("/decor/layout", get(get_layout))
}
