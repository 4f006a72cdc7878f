use once_cell::sync::OnceCell;
use reqwest::Client;
use std::time::Duration;

/// 全局复用的 HTTP Client（统一连接池/Keep-Alive），避免每个会话/请求重复创建。
///
/// - 图片拉取（预加载与导出）共用一个 client，超时固定为 30s。
/// - 存储管理请求（上传/列举）单独一个 client，超时取首次初始化时传入的配置值。
static IMAGE_CLIENT: OnceCell<Client> = OnceCell::new();
static STORAGE_CLIENT: OnceCell<Client> = OnceCell::new();

const USER_AGENT: &str = concat!("ransom-art/", env!("CARGO_PKG_VERSION"));

/// 拉取字母/装饰图片用的 HTTP Client。
pub fn image_client() -> Result<&'static Client, reqwest::Error> {
    IMAGE_CLIENT.get_or_try_init(|| {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
    })
}

/// 对象存储管理接口用的 HTTP Client。
pub fn storage_client(timeout: Duration) -> Result<&'static Client, reqwest::Error> {
    STORAGE_CLIENT.get_or_try_init(|| {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
    })
}
