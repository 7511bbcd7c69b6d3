use crate::common::config::NodeCommonConfig;

/// Produces the configuration handed to a worker when it registers.
pub trait NodeConfigSource: Send + Sync {
    fn node_config(&self) -> NodeCommonConfig;
}

impl NodeConfigSource for NodeCommonConfig {
    fn node_config(&self) -> NodeCommonConfig {
        self.clone()
    }
}
