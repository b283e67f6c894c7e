//! The abstract request/response capability consumed by the uploader.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use dbxup_protocol::Endpoint;

use crate::error::ClientError;

/// Boxed future returned by [`TransferClient::post`].
pub type ClientFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, ClientError>> + Send + 'a>>;

/// Sends one request to a content endpoint.
///
/// `args` are the endpoint's JSON arguments, `body` the raw payload
/// (file bytes, or nothing). On success the raw response body is returned;
/// non-2xx answers surface as [`ClientError::Remote`].
pub trait TransferClient: Send + Sync {
    fn post<'a>(
        &'a self,
        endpoint: Endpoint,
        args: &'a serde_json::Value,
        body: Option<Bytes>,
    ) -> ClientFuture<'a>;
}

impl<T: TransferClient + ?Sized> TransferClient for Arc<T> {
    fn post<'a>(
        &'a self,
        endpoint: Endpoint,
        args: &'a serde_json::Value,
        body: Option<Bytes>,
    ) -> ClientFuture<'a> {
        (**self).post(endpoint, args, body)
    }
}
