pub mod backend;
pub mod context;
pub mod directive;
pub mod emit;
pub mod frontend;
pub mod headers;
pub mod renderer;
pub mod tcp;
pub mod userlist;

pub use context::{DestinationView, RenderContext};
pub use directive::{Directive, Section, SectionKind};
pub use emit::Emitter;
pub use renderer::{RenderedConfig, Renderer};
pub use tcp::group_by_src_port;
