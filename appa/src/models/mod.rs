mod answer;
mod chunk;
mod conversation;
mod response;

pub use answer::*;
pub use chunk::*;
pub use conversation::*;
pub use response::*;
