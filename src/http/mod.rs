mod client;
mod transport;

pub use client::{
    build_url, parse_base_url, status_to_error, HttpClient, HEADER_AUTHORIZATION,
    HEADER_CONTENT_TYPE, HEADER_SIGNATURE,
};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};
