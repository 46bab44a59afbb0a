//! Remote source speaking HTTP to a server that publishes directory indexes.
//!
//! Listing scrapes the `href` targets of the index page. Size comes from
//! `Content-Length` and the modification token is the raw `Last-Modified`
//! header (falling back to `ETag`), both read with a `HEAD` request.
//! Names are percent-decoded from the index and re-encoded into request URLs.

use super::{RemoteFile, RemoteSource};
use crate::utils::errors::{MirrorError, Result};
use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;
use reqwest::header::{CONTENT_LENGTH, ETAG, LAST_MODIFIED};
use reqwest::StatusCode;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Bytes escaped in a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    href: Regex,
}

impl HttpSource {
    pub fn new(base_url: &str, connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!("mirror-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            href: index_link_regex(),
        })
    }

    fn dir_url(&self, directory: &str) -> String {
        let directory = directory.trim_matches('/');
        if directory.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}/{}/", self.base_url, directory)
        }
    }

    fn file_url(&self, directory: &str, name: &str) -> String {
        format!(
            "{}{}",
            self.dir_url(directory),
            utf8_percent_encode(name, PATH_SEGMENT)
        )
    }
}

fn index_link_regex() -> Regex {
    Regex::new(r#"(?i)href\s*=\s*"([^"]+)""#).expect("static regex is valid")
}

/// File names linked from a directory index page.
///
/// Subdirectories, parent links, absolute links and sort/query links are
/// skipped. Names are returned percent-decoded.
pub fn parse_index(href: &Regex, html: &str) -> Vec<String> {
    let mut names = Vec::new();
    for capture in href.captures_iter(html) {
        let target = capture[1].trim();
        let target = target.strip_prefix("./").unwrap_or(target);
        if target.is_empty()
            || target.starts_with('?')
            || target.starts_with('#')
            || target.starts_with('/')
            || target.contains("://")
            || target.contains('/')
        {
            continue;
        }
        let encoded = target.split(['?', '#']).next().unwrap_or_default();
        let Ok(name) = percent_decode_str(encoded).decode_utf8() else {
            continue;
        };
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            continue;
        }
        if !names.iter().any(|n| *n == name) {
            names.push(name.into_owned());
        }
    }
    names
}

#[async_trait]
impl RemoteSource for HttpSource {
    fn label(&self) -> String {
        self.base_url.clone()
    }

    async fn list_names(&self, directory: &str) -> Result<Vec<String>> {
        let url = self.dir_url(directory);
        debug!("Listing {}", url);

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::UNAUTHORIZED
        {
            return Err(MirrorError::RemoteDirectory {
                path: directory.to_string(),
                reason: format!("HTTP {status}"),
            });
        }
        if !status.is_success() {
            return Err(MirrorError::Remote(format!("HTTP {status}: {url}")));
        }

        let body = response.text().await?;
        Ok(parse_index(&self.href, &body))
    }

    async fn stat(&self, directory: &str, name: &str) -> Result<RemoteFile> {
        let url = self.file_url(directory, name);
        let response = self.client.head(&url).send().await?;
        if !response.status().is_success() {
            return Err(MirrorError::Remote(format!(
                "HTTP {}: {}",
                response.status(),
                url
            )));
        }

        let headers = response.headers();
        // Read the header itself: the body size hint of a HEAD response is zero.
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| MirrorError::Remote(format!("No Content-Length for {url}")))?;
        let mtime = headers
            .get(LAST_MODIFIED)
            .or_else(|| headers.get(ETAG))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| MirrorError::Remote(format!("No Last-Modified or ETag for {url}")))?;

        Ok(RemoteFile {
            name: name.to_string(),
            size,
            mtime,
        })
    }

    async fn retrieve(
        &self,
        directory: &str,
        name: &str,
        dest: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let url = self.file_url(directory, name);
        let mut response = self.client.get(&url).send().await?.error_for_status()?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            dest.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        dest.flush().await?;

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glob::Pattern;
    use tokio::io::AsyncReadExt;
    use tokio::net::{TcpListener, TcpStream};

    const INDEX: &str = r#"<html><head><title>Index of /releases/amd64/autobuilds/</title></head>
<body><h1>Index of /releases/amd64/autobuilds/</h1><hr><pre>
<a href="../">../</a>
<a href="?C=N;O=D">Name</a>
<a href="20240107T170309Z/">20240107T170309Z/</a>
<a href="latest-stage3-amd64-hardened.txt">latest-stage3-amd64-hardened.txt</a>
<a HREF="./latest-stage3-amd64-hardened.txt">again</a>
<a href="latest-stage3.txt?download=1">latest-stage3.txt</a>
<a href="release%20notes.txt">release notes.txt</a>
<a href="..%2Fescape.txt">escape</a>
<a href="https://www.gentoo.org/">Gentoo</a>
<a href="/icons/blank.gif">icon</a>
</pre><hr></body></html>"#;

    const LAST_MODIFIED_VALUE: &str = "Sun, 07 Jan 2024 17:03:09 GMT";

    const UPSTREAM_INDEX: &str = r#"<pre>
<a href="../">../</a>
<a href="20240107T170309Z/">20240107T170309Z/</a>
<a href="latest%20stage3.txt">latest stage3.txt</a>
<a href="digests.asc">digests.asc</a>
<a href="bare.bin">bare.bin</a>
<a href="broken.bin">broken.bin</a>
</pre>"#;

    type Reply = (&'static str, Vec<(&'static str, String)>, &'static str);

    fn route(path: &str) -> Reply {
        let sized = |body: &'static str| ("Content-Length", body.len().to_string());
        match path {
            "/pub/releases/" => ("200 OK", vec![sized(UPSTREAM_INDEX)], UPSTREAM_INDEX),
            "/pub/releases/latest%20stage3.txt" => (
                "200 OK",
                vec![
                    sized("stage3 bytes"),
                    ("Last-Modified", LAST_MODIFIED_VALUE.to_string()),
                    ("ETag", "\"ignored\"".to_string()),
                ],
                "stage3 bytes",
            ),
            "/pub/releases/digests.asc" => (
                "200 OK",
                vec![sized("sign"), ("ETag", "\"5e1f\"".to_string())],
                "sign",
            ),
            "/pub/releases/bare.bin" => ("200 OK", vec![sized("bare")], "bare"),
            "/pub/releases/broken.bin" => ("500 Internal Server Error", vec![sized("")], ""),
            "/pub/private/" => ("403 Forbidden", vec![sized("")], ""),
            "/pub/login/" => ("401 Unauthorized", vec![sized("")], ""),
            "/pub/busy/" => ("503 Service Unavailable", vec![sized("")], ""),
            _ => ("404 Not Found", vec![sized("")], ""),
        }
    }

    /// Answer one request on `stream`, then close it.
    async fn answer(mut stream: TcpStream) -> std::io::Result<()> {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Ok(());
            }
            request.extend_from_slice(&buf[..n]);
        }

        let head = String::from_utf8_lossy(&request);
        let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
        let method = request_line.next().unwrap_or_default();
        let path = request_line.next().unwrap_or_default();

        let (status, headers, body) = route(path);
        let mut response = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
        for (name, value) in headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        stream.write_all(response.as_bytes()).await?;
        if method != "HEAD" {
            stream.write_all(body.as_bytes()).await?;
        }
        stream.shutdown().await
    }

    /// Local upstream serving [`route`]; returns a source pointed at it.
    async fn upstream() -> Result<HttpSource> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(answer(stream));
            }
        });

        HttpSource::new(
            &format!("http://{addr}/pub"),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_parse_index() {
        let names = parse_index(&index_link_regex(), INDEX);
        assert_eq!(
            names,
            vec![
                "latest-stage3-amd64-hardened.txt",
                "latest-stage3.txt",
                "release notes.txt"
            ]
        );
    }

    #[test]
    fn test_urls() -> Result<()> {
        let source = HttpSource::new(
            "https://mirror.example/pub/gentoo/",
            Duration::from_secs(5),
            Duration::from_secs(5),
        )?;
        assert_eq!(
            source.dir_url("/releases/amd64/autobuilds/"),
            "https://mirror.example/pub/gentoo/releases/amd64/autobuilds/"
        );
        assert_eq!(source.dir_url("/"), "https://mirror.example/pub/gentoo/");
        assert_eq!(
            source.file_url("releases/snapshots/current", "portage-latest.tar.bz2"),
            "https://mirror.example/pub/gentoo/releases/snapshots/current/portage-latest.tar.bz2"
        );
        assert_eq!(
            source.file_url("releases", "release notes #1.txt"),
            "https://mirror.example/pub/gentoo/releases/release%20notes%20%231.txt"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_list_names_from_index() -> Result<()> {
        let source = upstream().await?;
        let names = source.list_names("/releases/").await?;
        assert_eq!(
            names,
            vec!["latest stage3.txt", "digests.asc", "bare.bin", "broken.bin"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_directories() -> Result<()> {
        let source = upstream().await?;
        for directory in ["/missing/", "/private/", "/login/"] {
            let err = source.list_names(directory).await.unwrap_err();
            assert!(
                matches!(err, MirrorError::RemoteDirectory { ref path, .. } if path == directory),
                "{directory}: {err}"
            );
        }

        let err = source.list_names("/busy/").await.unwrap_err();
        assert!(matches!(err, MirrorError::Remote(_)), "{err}");
        Ok(())
    }

    #[tokio::test]
    async fn test_stat_reads_headers() -> Result<()> {
        let source = upstream().await?;

        let file = source.stat("/releases/", "latest stage3.txt").await?;
        assert_eq!(
            file,
            RemoteFile {
                name: "latest stage3.txt".to_string(),
                size: 12,
                mtime: LAST_MODIFIED_VALUE.to_string(),
            }
        );

        let file = source.stat("/releases/", "digests.asc").await?;
        assert_eq!(file.size, 4);
        assert_eq!(file.mtime, "\"5e1f\"");
        Ok(())
    }

    #[tokio::test]
    async fn test_stat_failures() -> Result<()> {
        let source = upstream().await?;
        let no_token = source.stat("/releases/", "bare.bin").await.unwrap_err();
        assert!(matches!(no_token, MirrorError::Remote(_)), "{no_token}");

        let server_error = source.stat("/releases/", "broken.bin").await.unwrap_err();
        assert!(matches!(server_error, MirrorError::Remote(_)), "{server_error}");
        Ok(())
    }

    #[tokio::test]
    async fn test_list_and_retrieve() -> Result<()> {
        let source = upstream().await?;

        let files = source
            .list("/releases/", &Pattern::new("latest*")?)
            .await?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "latest stage3.txt");

        let mut body: Vec<u8> = Vec::new();
        let written = source
            .retrieve("/releases/", "latest stage3.txt", &mut body)
            .await?;
        assert_eq!(written, 12);
        assert_eq!(body, b"stage3 bytes");

        let missing = source.retrieve("/releases/", "gone.bin", &mut Vec::<u8>::new()).await;
        assert!(matches!(missing, Err(MirrorError::Http(_))));
        Ok(())
    }
}
