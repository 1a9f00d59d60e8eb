pub mod audio;
pub mod canvas;
pub mod color;
pub mod encoding;
pub mod error_codes;
pub mod export;
pub mod font8x8;
pub mod fonts;
pub mod logging;
pub mod renderer;
pub mod scene;
pub mod schema;
pub mod scroll;
pub mod timeline;
