// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Shared HTTP plumbing for research adapters: client construction, status
// translation and size-capped page fetches.

use reqwest::StatusCode;

use crate::domain::research::ResearchError;

/// Pages larger than this are truncated before analysis.
pub const MAX_PAGE_BYTES: usize = 256 * 1024;

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(concat!("aegis-healer/", env!("CARGO_PKG_VERSION")))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Maps a non-success status to a research error.
pub fn status_error(status: StatusCode, body: String) -> ResearchError {
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::FORBIDDEN {
        ResearchError::RateLimit
    } else {
        ResearchError::Provider(format!("HTTP {}: {}", status, body))
    }
}

/// GETs `url` and returns its body as text, capped at [`MAX_PAGE_BYTES`].
pub async fn fetch_page(client: &reqwest::Client, url: &str) -> Result<String, ResearchError> {
    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ResearchError::Network(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(status, body));
    }

    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ResearchError::InvalidResponse(e.to_string()))?
    {
        let room = MAX_PAGE_BYTES - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(decode_capped(body))
}

/// Decodes a possibly truncated page, dropping a multi-byte character cut
/// in half by the cap.
fn decode_capped(mut bytes: Vec<u8>) -> String {
    if let Err(e) = std::str::from_utf8(&bytes) {
        if e.error_len().is_none() {
            bytes.truncate(e.valid_up_to());
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_page_truncates_large_bodies() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/big")
            .with_status(200)
            .with_body("é".repeat(MAX_PAGE_BYTES))
            .create_async()
            .await;

        let body = fetch_page(&build_client(), &format!("{}/big", server.url())).await.unwrap();
        assert!(body.len() <= MAX_PAGE_BYTES);
        assert!(body.chars().all(|c| c == 'é'));
    }

    #[tokio::test]
    async fn test_fetch_page_stops_reading_at_the_cap() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/stream")
            .with_status(200)
            .with_chunked_body(|w| {
                use std::io::Write;
                let chunk = vec![b'a'; 64 * 1024];
                for _ in 0..64 {
                    w.write_all(&chunk)?;
                }
                Ok(())
            })
            .create_async()
            .await;

        let body = fetch_page(&build_client(), &format!("{}/stream", server.url())).await.unwrap();
        assert_eq!(body.len(), MAX_PAGE_BYTES);
    }

    #[test]
    fn test_decode_capped_drops_split_character() {
        let mut bytes = "ab".as_bytes().to_vec();
        bytes.extend_from_slice(&"é".as_bytes()[..1]);
        assert_eq!(decode_capped(bytes), "ab");
        assert_eq!(decode_capped(vec![b'x', 0xff, b'y']), "x\u{fffd}y");
    }

    #[tokio::test]
    async fn test_fetch_page_maps_rate_limit() {
        let mut server = mockito::Server::new_async().await;
        let _m = server.mock("GET", "/limited").with_status(429).create_async().await;

        let err = fetch_page(&build_client(), &format!("{}/limited", server.url())).await.unwrap_err();
        assert_eq!(err, ResearchError::RateLimit);
    }
}
