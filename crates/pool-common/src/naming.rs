use rand::distributions::Alphanumeric;
use rand::Rng;

/// A random alphanumeric string of `len` characters, used both for the
/// per-container path suffix and (with a longer length, hex-encoded
/// separately) for tokens.
pub fn random_alnum(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// 24 raw random bytes, hex-encoded to 48 characters, per §3's token spec.
pub fn random_token_hex() -> String {
    let bytes: [u8; 24] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Render the container command template. Substitution is simple textual
/// replacement of each placeholder, applied exactly once per container.
pub fn render_command(template: &str, base_path: &str, port: u16, ip: &str, token: &str) -> String {
    template
        .replacen("{base_path}", base_path, 1)
        .replacen("{port}", &port.to_string(), 1)
        .replacen("{ip}", ip, 1)
        .replacen("{token}", token, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_alnum_has_requested_length() {
        let s = random_alnum(12);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn random_token_hex_is_48_chars() {
        let t = random_token_hex();
        assert_eq!(t.len(), 48);
        assert!(t.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn render_command_substitutes_every_placeholder() {
        let out = render_command(
            "jupyter --base-url={base_path} --port={port} --ip={ip} --token={token}",
            "/pool/abc123",
            8888,
            "0.0.0.0",
            "deadbeef",
        );
        assert_eq!(
            out,
            "jupyter --base-url=/pool/abc123 --port=8888 --ip=0.0.0.0 --token=deadbeef"
        );
    }

    #[test]
    fn render_command_replaces_each_placeholder_only_once() {
        let out = render_command("{token}{token}", "/p", 1, "i", "T");
        assert_eq!(out, "T{token}");
    }
}
