use std::io::Write;

use rx_domain::RtError;

/// Builds the creds file content the transport reads via
/// `user_credentials`, verbatim down to the spacing, and writes it to a
/// process-owned temp file so nothing outlives the session on disk.
///
/// Never log `secret` — it's an NKEY seed.
pub fn materialize(api_key: &str, secret: &str) -> Result<tempfile::NamedTempFile, RtError> {
    if api_key.is_empty() {
        return Err(RtError::config("api_key must not be empty"));
    }
    if secret.is_empty() {
        return Err(RtError::config("secret must not be empty"));
    }

    let contents = format!(
        "\n-----BEGIN NATS USER JWT-----\n{api_key}\n------END NATS USER JWT------\n\n\
************************* IMPORTANT *************************\n\
NKEY Seed printed below can be used to sign and prove identity.\n\
NKEYs are sensitive and should be treated as secrets.\n\n\
-----BEGIN USER NKEY SEED-----\n{secret}\n------END USER NKEY SEED------\n\n\
*************************************************************\n"
    );

    let mut file = tempfile::NamedTempFile::new()
        .map_err(|e| RtError::config(format!("creating creds file: {e}")))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| RtError::config(format!("writing creds file: {e}")))?;
    file.flush()
        .map_err(|e| RtError::config(format!("flushing creds file: {e}")))?;

    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn rejects_empty_fields() {
        assert!(materialize("", "seed").is_err());
        assert!(materialize("jwt", "").is_err());
    }

    #[test]
    fn embeds_both_values_and_never_truncates_them() {
        let mut file = materialize("my-jwt-value", "my-seed-value").unwrap();
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();

        assert!(contents.contains("BEGIN NATS USER JWT"));
        assert!(contents.contains("my-jwt-value"));
        assert!(contents.contains("BEGIN USER NKEY SEED"));
        assert!(contents.contains("my-seed-value"));
    }
}
