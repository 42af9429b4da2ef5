//! Azure Blob Storage object store.
//!
//! Talks to the Blob service REST API of a single container, authorized
//! with a SAS token. Only the four operations the credential bridge needs
//! are implemented: List Blobs (paged), Get Blob, Put Blob (block blob,
//! always overwriting) and Delete Blob.
//!
//! The SAS token is wrapped in [`SecretString`] and appended to request URLs
//! at the last moment; authorized URLs are never logged.

use std::time::Duration;

use reqwest::{Response, StatusCode, Url};
use secrecy::{ExposeSecret, SecretString};
use vitrine_core::storage::ObjectStore;
use vitrine_types::error::StoreError;

pub struct AzureBlobStore {
    client: reqwest::Client,
    /// Container URL without query string.
    container: Url,
    sas: Option<SecretString>,
}

impl AzureBlobStore {
    /// Blob service REST API version sent with every request.
    const API_VERSION: &'static str = "2021-08-06";

    /// Create a store for `container_url`.
    ///
    /// A SAS token embedded in the URL's query string is used when `sas` is
    /// `None`.
    pub fn new(
        container_url: &str,
        sas: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut container = Url::parse(container_url)
            .map_err(|e| StoreError::Request(format!("invalid container URL: {e}")))?;
        if container.cannot_be_a_base() {
            return Err(StoreError::Request(format!(
                "invalid container URL: {container_url}"
            )));
        }

        let embedded = container
            .query()
            .filter(|q| !q.is_empty())
            .map(|q| SecretString::from(q.to_string()));
        container.set_query(None);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Request(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            container,
            sas: sas.or(embedded),
        })
    }

    pub fn container_url(&self) -> &Url {
        &self.container
    }

    /// Unauthorized URL of one blob.
    fn blob_url(&self, name: &str) -> Result<Url, StoreError> {
        if name.is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        let mut url = self.container.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Request("container URL cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(name.split('/'));
        Ok(url)
    }

    /// Unauthorized URL of one List Blobs page.
    fn list_url(&self, prefix: &str, marker: Option<&str>) -> Url {
        let mut url = self.container.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("restype", "container")
                .append_pair("comp", "list");
            if !prefix.is_empty() {
                query.append_pair("prefix", prefix);
            }
            if let Some(marker) = marker {
                query.append_pair("marker", marker);
            }
        }
        url
    }

    /// Append the SAS token to the query string.
    fn authorize(&self, mut url: Url) -> Url {
        if let Some(sas) = &self.sas {
            let sas = sas.expose_secret().trim_start_matches('?');
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{sas}"),
                _ => sas.to_string(),
            };
            url.set_query(Some(&query));
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, StoreError> {
        request
            .header("x-ms-version", Self::API_VERSION)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.without_url().to_string()))
    }
}

/// Turn a non-success response into [`StoreError::Remote`], preferring the
/// service's error code over the body.
async fn check(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let message = match code {
        Some(code) => code,
        None => response.text().await.unwrap_or_default(),
    };
    Err(StoreError::Remote {
        status: status.as_u16(),
        message,
    })
}

impl ObjectStore for AzureBlobStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let url = self.authorize(self.list_url(prefix, marker.as_deref()));
            let response = check(self.send(self.client.get(url)).await?).await?;
            let body = response
                .text()
                .await
                .map_err(|e| StoreError::Request(e.without_url().to_string()))?;

            let page = parse_list_page(&body);
            names.extend(page.names);
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        tracing::debug!(prefix, count = names.len(), "listed blobs");
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let url = self.authorize(self.blob_url(name)?);
        let response = self.send(self.client.get(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = check(response)
            .await?
            .bytes()
            .await
            .map_err(|e| StoreError::Request(e.without_url().to_string()))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn put(&self, name: &str, data: &[u8]) -> Result<(), StoreError> {
        let url = self.authorize(self.blob_url(name)?);
        let request = self
            .client
            .put(url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("content-type", "application/octet-stream")
            .body(data.to_vec());
        check(self.send(request).await?).await?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let url = self.authorize(self.blob_url(name)?);
        let response = self.send(self.client.delete(url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }
}

impl std::fmt::Debug for AzureBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureBlobStore")
            .field("container", &self.container.as_str())
            .field("sas", &self.sas.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One page of a List Blobs response.
#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    names: Vec<String>,
    next_marker: Option<String>,
}

/// Extract blob names and the continuation marker from a List Blobs body.
///
/// The response schema is small and fixed, so a tag scan is enough.
fn parse_list_page(xml: &str) -> ListPage {
    let names = xml
        .split("<Blob>")
        .skip(1)
        .filter_map(|blob| tag_value(blob, "Name"))
        .collect();
    let next_marker = tag_value(xml, "NextMarker").filter(|m| !m.is_empty());
    ListPage { names, next_marker }
}

/// Text of the first `<tag>...</tag>` in `xml`, unescaped.
fn tag_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = xml.find(&open)? + open.len();
    let end = start + xml[start..].find(&close)?;
    Some(unescape_xml(&xml[start..end]))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(url: &str, sas: Option<&str>) -> AzureBlobStore {
        AzureBlobStore::new(
            url,
            sas.map(|s| SecretString::from(s.to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn blob_urls_keep_name_segments_and_append_sas() {
        let store = store(
            "https://acct.blob.core.windows.net/sessions/",
            Some("?sv=2024-01-01&sig=abc%3D"),
        );
        let url = store.authorize(store.blob_url("auth/creds.json").unwrap());
        assert_eq!(
            url.as_str(),
            "https://acct.blob.core.windows.net/sessions/auth/creds.json?sv=2024-01-01&sig=abc%3D"
        );
    }

    #[test]
    fn sas_embedded_in_container_url_is_used() {
        let store = store("https://acct.blob.core.windows.net/sessions?sv=1&sig=x", None);
        assert_eq!(
            store.container_url().as_str(),
            "https://acct.blob.core.windows.net/sessions"
        );
        let url = store.authorize(store.list_url("auth/", Some("m1")));
        assert_eq!(
            url.query(),
            Some("restype=container&comp=list&prefix=auth%2F&marker=m1&sv=1&sig=x")
        );
    }

    #[test]
    fn rejects_unusable_urls_and_names() {
        assert!(AzureBlobStore::new("not a url", None, Duration::from_secs(1)).is_err());
        assert!(AzureBlobStore::new("mailto:ops@example.com", None, Duration::from_secs(1)).is_err());
        let store = store("https://acct.blob.core.windows.net/sessions", None);
        assert!(matches!(store.blob_url(""), Err(StoreError::InvalidName(_))));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let store = store("https://acct.blob.core.windows.net/sessions", Some("sig=secret"));
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn parses_list_page_with_marker() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<EnumerationResults ServiceEndpoint="https://acct.blob.core.windows.net/" ContainerName="sessions">
  <Prefix>auth/</Prefix>
  <Blobs>
    <Blob><Name>auth/creds.json</Name><Properties><Content-Length>12</Content-Length></Properties></Blob>
    <Blob><Name>auth/app-state-sync-key-A&amp;B.json</Name><Properties /></Blob>
  </Blobs>
  <NextMarker>2!88!MDAwMDIx</NextMarker>
</EnumerationResults>"#;

        assert_eq!(
            parse_list_page(xml),
            ListPage {
                names: vec![
                    "auth/creds.json".to_string(),
                    "auth/app-state-sync-key-A&B.json".to_string()
                ],
                next_marker: Some("2!88!MDAwMDIx".to_string()),
            }
        );
    }

    #[test]
    fn last_page_has_no_marker() {
        let xml = "<EnumerationResults><Blobs /><NextMarker /></EnumerationResults>";
        assert_eq!(parse_list_page(xml), ListPage::default());

        let xml = "<EnumerationResults><Blobs></Blobs><NextMarker></NextMarker></EnumerationResults>";
        assert_eq!(parse_list_page(xml), ListPage::default());
    }
}
