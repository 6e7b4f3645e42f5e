//! M3U playlist import for the admin editor

use std::collections::HashMap;
use std::time::Duration;

/// One `#EXTINF` entry of a playlist
#[derive(Debug, Clone)]
pub struct M3uEntry {
    pub name: String,
    pub url: String,
    pub group: Option<String>,
    pub tvg_id: Option<String>,
    pub tvg_logo: Option<String>,
}

/// Download a playlist (HTTP and HTTPS)
pub fn download(url: &str) -> Result<String, String> {
    let agent = ureq::Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(60)))
        .timeout_connect(Some(Duration::from_secs(15)))
        .build()
        .new_agent();

    let mut response = agent
        .get(url)
        .call()
        .map_err(|e| format!("Request failed: {}", e))?;

    if response.status() != 200 {
        return Err(format!("HTTP error: {}", response.status()));
    }

    response
        .body_mut()
        .read_to_string()
        .map_err(|e| format!("Read failed: {}", e))
}

/// Parse M3U content into entries; lines without a preceding `#EXTINF` are skipped
pub fn parse_m3u(content: &str) -> Vec<M3uEntry> {
    let mut entries = Vec::new();
    let mut current_attrs: HashMap<String, String> = HashMap::new();
    let mut current_name: Option<String> = None;

    for line in content.lines() {
        let line = line.trim();

        if let Some(info) = line.strip_prefix("#EXTINF:") {
            current_attrs.clear();
            extract_attrs(info, &mut current_attrs);

            // Name follows the last comma
            current_name = info.rfind(',').map(|pos| info[pos + 1..].trim().to_string());
        } else if !line.is_empty() && !line.starts_with('#') {
            if let Some(name) = current_name.take() {
                entries.push(M3uEntry {
                    name,
                    url: line.to_string(),
                    group: current_attrs.remove("group-title"),
                    tvg_id: current_attrs.remove("tvg-id"),
                    tvg_logo: current_attrs.remove("tvg-logo"),
                });
            }
        }
    }

    entries
}

/// Pull `key=value` / `key="value"` pairs out of an EXTINF body
fn extract_attrs(info: &str, attrs: &mut HashMap<String, String>) {
    // Drop the duration, attributes end at the name comma
    let body = info.trim_start_matches(|c: char| c.is_ascii_digit() || c == '-' || c == '.');
    let mut chars = body.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == '"') {
            chars.next();
        }

        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ',' {
                break;
            }
            key.push(c);
            chars.next();
        }
        // a comma (or end) means the rest is the channel name
        if chars.next() != Some('=') {
            return;
        }

        let key = key.trim().to_lowercase();
        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '"' { break; }
                if c == '\\' && chars.peek() == Some(&'"') {
                    chars.next();
                    value.push('"');
                    continue;
                }
                value.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == ',' { break; }
                value.push(c);
                chars.next();
            }
        }

        if !key.is_empty() && !value.is_empty() {
            attrs.insert(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_playlist() {
        let content = r#"
#EXTM3U
#EXTINF:-1 tvg-id="cnn" tvg-logo="http://logo/cnn.png" group-title="News",CNN International
http://example.com/live/cnn.m3u8
#EXTINF:-1 group-title="Kids",Toons
http://example.com/live/toons.ts
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "CNN International");
        assert_eq!(entries[0].group.as_deref(), Some("News"));
        assert_eq!(entries[0].tvg_logo.as_deref(), Some("http://logo/cnn.png"));
        assert_eq!(entries[0].tvg_id.as_deref(), Some("cnn"));
        assert_eq!(entries[1].url, "http://example.com/live/toons.ts");
    }

    #[test]
    fn test_unquoted_attributes() {
        let content = "#EXTM3U\n#EXTINF:-1 tvg-id=unquoted group-title=\"Quoted Group\",Test Channel\nhttp://example.com/stream.ts\n";
        let entries = parse_m3u(content);
        assert_eq!(entries[0].tvg_id.as_deref(), Some("unquoted"));
        assert_eq!(entries[0].group.as_deref(), Some("Quoted Group"));
    }

    #[test]
    fn test_url_without_extinf_is_skipped() {
        let content = "#EXTM3U\nhttp://example.com/orphan.ts\n#EXTINF:0,Named\nhttp://example.com/named.ts\n";
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "Named");
        assert_eq!(entries[0].group, None);
    }

    #[test]
    fn test_stray_quote_before_attribute() {
        let content = r#"#EXTM3U
#EXTINF:0 tvg-logo="https://example.com/logo.png" "tvg-name="SRF1.ch" group-title="Deutsch", SRF 1 FHD
udp://@233.50.230.1:5000
"#;
        let entries = parse_m3u(content);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "SRF 1 FHD");
        assert_eq!(entries[0].group.as_deref(), Some("Deutsch"));
        assert_eq!(entries[0].tvg_logo.as_deref(), Some("https://example.com/logo.png"));
    }
}
