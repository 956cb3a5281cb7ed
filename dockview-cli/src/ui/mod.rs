mod render;
mod theme;

pub use render::draw;
pub use theme::styles;
