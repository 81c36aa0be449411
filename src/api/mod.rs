// API Module - the upload and read surface a transport layer would expose
//
// - dto: serializable request/response shapes
// - service: upload, file-with-proof and root lookups
// - client: verification of served files against a trusted root

pub mod client;
mod dto;
mod service;

pub use client::verify_download;
pub use dto::{FileResponse, ProofResponse, UploadRequest, UploadResponse};
pub use service::FileService;
