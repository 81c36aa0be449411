// Client-side verification of downloaded files

use crate::api::dto::FileResponse;
use crate::error::Error;
use crate::proof;

/// Decode a served file and check its proof against a root the caller trusts
///
/// Returns the file contents on success.
pub fn verify_download(response: &FileResponse, root: &str) -> Result<Vec<u8>, Error> {
    let root = proof::decode_hash(root)?;
    let contents = proof::decode_hex(&response.file)?;
    let inclusion = response.proof.decode()?;

    if !inclusion.verify(&contents, &root) {
        return Err(Error::RootMismatch {
            declared: proof::encode_hex(&root),
            computed: "proof does not lead to root".to_string(),
        });
    }
    Ok(contents)
}
