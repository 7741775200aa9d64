pub mod assembler;
pub mod pipeline;

pub use assembler::assemble;
pub use pipeline::Pipeline;
