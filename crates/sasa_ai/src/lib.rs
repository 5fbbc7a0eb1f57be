pub mod aliyun;
pub mod breaker;
pub mod deepseek;
pub mod llm;
pub mod mock;
pub mod retry;
pub mod siliconflow;
pub mod zhipu;

pub use aliyun::AliyunImageEdit;
pub use breaker::CircuitBreaker;
pub use deepseek::DeepSeekText;
pub use llm::{ChatMessage, ImageEditProvider, Reply, Role, TextProvider, VisionProvider};
pub use siliconflow::SiliconFlowClassifier;
pub use zhipu::ZhipuVision;
