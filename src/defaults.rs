//! Built-in channel lineup, used when neither storage nor the seed URL yield channels

use crate::models::Channel;

fn channel(
    id: &str,
    name: &str,
    category: &str,
    description: &str,
    video_url: &str,
    current_program: &str,
    rating: u8,
) -> Channel {
    Channel {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        description: description.to_string(),
        video_url: video_url.to_string(),
        thumbnail: String::new(),
        current_program: current_program.to_string(),
        rating: Some(rating),
        is_favorite: None,
    }
}

pub fn default_channels() -> Vec<Channel> {
    vec![
        channel(
            "bbb-hls",
            "Open Movie HLS",
            "Movies",
            "Big Buck Bunny as an adaptive stream",
            "https://test-streams.mux.dev/x36xhzz/x36xhzz.m3u8",
            "Big Buck Bunny",
            4,
        ),
        channel(
            "akamai-live",
            "Live Test Feed",
            "News",
            "Continuous live test stream",
            "https://cph-p2p-msl.akamaized.net/hls/live/2000341/test/master.m3u8",
            "Live Coverage",
            3,
        ),
        channel(
            "tears-of-steel",
            "Sci-Fi Shorts",
            "Sci-Fi",
            "Tears of Steel, multi-bitrate",
            "https://demo.unified-streaming.com/k8s/features/stable/video/tears-of-steel/tears-of-steel.ism/.m3u8",
            "Tears of Steel",
            4,
        ),
        channel(
            "elephants-dream",
            "Animation Classics",
            "Animation",
            "Progressive MP4 channel",
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ElephantsDream.mp4",
            "Elephants Dream",
            3,
        ),
        channel(
            "sintel",
            "Fantasy Cinema",
            "Movies",
            "Progressive MP4 channel",
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/Sintel.mp4",
            "Sintel",
            5,
        ),
        channel(
            "for-bigger-blazes",
            "Tech Showcase",
            "Technology",
            "Short product demos on loop",
            "https://commondatastorage.googleapis.com/gtv-videos-bucket/sample/ForBiggerBlazes.mp4",
            "For Bigger Blazes",
            2,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_default_ids_are_unique() {
        let channels = default_channels();
        let ids: HashSet<_> = channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids.len(), channels.len());
    }
}
