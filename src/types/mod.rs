//! Value types for light control parameters.

mod brightness;
mod color;
mod kelvin;
mod power;
mod scene;

pub use brightness::Brightness;
pub use color::Color;
pub use kelvin::Kelvin;
pub use power::PowerState;
pub use scene::SceneCode;
