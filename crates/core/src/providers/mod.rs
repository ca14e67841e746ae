pub mod anthropic;

pub use anthropic::AnthropicTransport;
