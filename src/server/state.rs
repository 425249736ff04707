use std::sync::Arc;

use crate::enhancer::Enhancer;

/// 应用状态
pub struct AppState {
    /// 已加载的增强器，所有请求共享且只读
    pub enhancer: Arc<Enhancer>,
}

impl AppState {
    pub fn new(enhancer: Arc<Enhancer>) -> Arc<Self> {
        Arc::new(AppState { enhancer })
    }
}
