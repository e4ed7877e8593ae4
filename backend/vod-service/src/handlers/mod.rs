mod auth;
mod search;
mod uploads;
mod videos;

pub use auth::login;
pub use search::search;
pub use uploads::signed_url;
pub use videos::{create_video, get_video, list_videos, publish_video};
