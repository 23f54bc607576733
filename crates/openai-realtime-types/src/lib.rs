pub mod audio;
pub mod credential;
pub mod events;
pub mod session;
mod content;

pub use content::items::{Item, ItemStatus};
pub use content::message::*;
pub use credential::{ClientSecret, EphemeralSession};
pub use events::{ClientEvent, ServerEvent};
pub use session::{Modality, Session, SessionConfigurator};
