pub mod function;
pub mod gemini;

pub use function::FunctionClient;
pub use gemini::{GeminiClient, GenerativeModel};
