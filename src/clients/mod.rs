pub mod offline_db;
pub mod qbittorrent;
pub mod video_search;
