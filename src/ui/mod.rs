pub mod colour;
pub mod compositing;
pub mod drawing;
pub mod font;
pub mod glyph_cache;
pub mod text_rasterizing;
pub mod theme;
pub mod zone;

pub use colour::Colour;
pub use font::Font;
pub use text_rasterizing::{CosmicRasterizer, FontError, Glyph, Rasterize};
pub use zone::{DrawSession, ZoneId, ZonePosition, Zones};
