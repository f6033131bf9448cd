use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use url::Url;
use crate::core::{
    ChunkRequest,
    ChunkResponse,
    FinalizeRequest,
    InitiateRequest,
    InitiateResponse,
    MediaMetadata,
    RemoteFile,
    Result,
    TransportAdapter,
    UploadError,
};

#[derive(Serialize)]
struct InitBody<'a> {
    name: &'a str,
    size_bytes: u64,
    mime_type: &'a str,
    chunk_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a MediaMetadata>,
}

#[derive(Serialize)]
struct CompleteBody<'a> {
    upload_id: &'a str,
    name: &'a str,
    total_chunks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a MediaMetadata>,
}

/// HTTP 传输适配器
///
/// `{endpoint}/init`、`{endpoint}/chunk`、`{endpoint}/complete` 三个接口。
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        Self::with_client(Client::new(), endpoint, token)
    }

    pub fn with_client(client: Client, endpoint: &str, token: Option<String>) -> Result<Self> {
        // 保证以 `/` 结尾，join 时才不会替换最后一段路径
        let mut endpoint = Url::parse(endpoint)?;
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }

        Ok(Self {
            client,
            endpoint,
            token,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.endpoint.join(path)?)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.is_empty() {
            format!("{what} failed")
        } else {
            format!("{what} failed: {body}")
        };
        Err(UploadError::server_error(status.as_u16(), message))
    }
}

#[async_trait]
impl TransportAdapter for HttpTransport {
    async fn initiate(&self, request: InitiateRequest) -> Result<InitiateResponse> {
        let body = InitBody {
            name: &request.name,
            size_bytes: request.size_bytes,
            mime_type: &request.mime_type,
            chunk_size_bytes: request.chunk_size_bytes,
            preview: request.preview.as_ref().map(|p| p.to_data_url()),
            metadata: request.metadata.as_ref(),
        };

        let response = self
            .authorize(self.client.post(self.url("init")?))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, "Initiate upload").await?;

        let result: InitiateResponse = response.json().await?;
        tracing::debug!(upload_id = %result.upload_id, "Upload initiated");
        Ok(result)
    }

    async fn upload_chunk(&self, request: ChunkRequest) -> Result<ChunkResponse> {
        let chunk = Part::bytes(request.data.to_vec())
            .file_name(format!("chunk-{}", request.chunk_index))
            .mime_str("application/octet-stream")?;
        let mut form = Form::new().part("chunk", chunk);

        if let Some(preview) = &request.preview {
            let part = Part::bytes(preview.data.to_vec())
                .file_name("preview")
                .mime_str(&preview.mime_type)?;
            form = form.part("preview", part);
        }
        if let Some(metadata) = &request.metadata {
            let json = serde_json::to_string(metadata)
                .map_err(|err| UploadError::transport(format!("metadata serialization: {err}")))?;
            form = form.text("metadata", json);
        }

        let response = self
            .authorize(self.client.put(self.url("chunk")?))
            .header("X-Upload-Id", &request.upload_id)
            .header("X-Chunk-Index", request.chunk_index.to_string())
            .header("X-Total-Chunks", request.total_chunks.to_string())
            .multipart(form)
            .send()
            .await?;
        let what = format!("Upload chunk {}", request.chunk_index);
        let response = Self::check(response, &what).await?;

        Ok(response.json().await?)
    }

    async fn finalize(&self, request: FinalizeRequest) -> Result<RemoteFile> {
        let descriptor = request.descriptor.as_ref();
        let body = CompleteBody {
            upload_id: &request.upload_id,
            name: &request.name,
            total_chunks: request.total_chunks,
            size_bytes: descriptor.map(|d| d.size_bytes),
            mime_type: descriptor.map(|d| d.mime_type.as_str()),
            metadata: descriptor.and_then(|d| d.metadata.as_ref()),
        };

        let response = self
            .authorize(self.client.post(self.url("complete")?))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, "Complete upload").await?;

        Ok(response.json().await?)
    }
}
