pub mod health;
pub mod playlists;
