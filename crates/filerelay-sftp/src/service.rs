// ── SftpFs – one authenticated SFTP session rooted at a directory ───────────

use crate::error::{op_error, SftpError};
use crate::types::SftpEndpointConfig;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use filerelay_core::fs::{FsResult, RemoteEntry, RemoteFs};
use filerelay_core::retry::{attempt, RetryPolicy};
use log::{debug, info, warn};
use ssh2::{HashType, OpenFlags, OpenType, RenameFlags, Session, Sftp};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const FILE_MODE: i32 = 0o640;
const DIR_MODE: i32 = 0o740;

pub struct SftpFs {
    sftp: Mutex<Sftp>,
    #[allow(dead_code)] // owns the SSH transport the channel runs on
    session: Session,
    #[allow(dead_code)] // held to keep the TCP connection alive
    tcp: TcpStream,
    root: String,
    endpoint: String,
}

impl SftpFs {
    // ── Connect ──────────────────────────────────────────────────────────────

    /// Connect, verify the host key and authenticate, retrying transient
    /// failures up to `connect_attempts` times.
    pub async fn connect(config: &SftpEndpointConfig) -> Result<SftpFs, SftpError> {
        let policy = RetryPolicy::with_delay(
            config.connect_attempts,
            Duration::from_millis(config.connect_retry_delay_ms),
        );
        let outcome = attempt(
            policy,
            |n| async move {
                let result = open(config);
                if let Err(ref e) = result {
                    warn!("SFTP connect to {} failed (attempt {}): {}", config.endpoint(), n, e);
                }
                result
            },
            |result| match result {
                Ok(_) => true,
                Err(e) => e.is_permanent(),
            },
        )
        .await;

        match outcome.value {
            Ok(fs) => Ok(fs),
            Err(e) if e.is_permanent() || outcome.tries == 1 => Err(e),
            Err(e) => Err(SftpError::Exhausted {
                attempts: outcome.tries,
                last: Box::new(e),
            }),
        }
    }

    fn channel(&self) -> MutexGuard<'_, Sftp> {
        self.sftp.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, path: &str) -> String {
        resolve(&self.root, path)
    }

    fn ensure_parent(&self, sftp: &Sftp, remote: &str) {
        for dir in parent_dirs(remote) {
            if sftp.stat(Path::new(&dir)).is_err() {
                if let Err(e) = sftp.mkdir(Path::new(&dir), DIR_MODE) {
                    debug!("mkdir '{}' on {}: {}", dir, self.endpoint, e);
                }
            }
        }
    }
}

fn open(config: &SftpEndpointConfig) -> Result<SftpFs, SftpError> {
    let addr = format!("{}:{}", config.host, config.port);
    info!("SFTP connecting to {}", addr);

    let socket = addr
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| SftpError::Address(addr.clone()))?;

    let tcp = TcpStream::connect_timeout(&socket, Duration::from_secs(config.timeout_secs))
        .map_err(|source| SftpError::Tcp {
            addr: addr.clone(),
            source,
        })?;
    let stream = tcp.try_clone().map_err(|source| SftpError::Tcp {
        addr: addr.clone(),
        source,
    })?;

    let mut session = Session::new().map_err(SftpError::Handshake)?;
    session.set_timeout(timeout_ms(config.timeout_secs));
    session.set_tcp_stream(stream);
    session.handshake().map_err(SftpError::Handshake)?;

    if let Some(ref expected) = config.host_fingerprint {
        let sha256 = session.host_key_hash(HashType::Sha256);
        let md5 = session.host_key_hash(HashType::Md5);
        if !fingerprint_matches(expected, sha256, md5) {
            return Err(SftpError::HostKeyMismatch {
                expected: expected.clone(),
                actual: sha256
                    .map(|h| format!("SHA256:{}", STANDARD_NO_PAD.encode(h)))
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }
    }

    let method = authenticate(&session, config).map_err(SftpError::Auth)?;
    if !session.authenticated() {
        return Err(SftpError::Auth("not authenticated after auth attempt".into()));
    }
    info!("SFTP authenticated to {} via {}", addr, method);

    let keepalive = config.keepalive_interval_secs;
    session.set_keepalive(keepalive > 0, keepalive as u32);

    let sftp = session.sftp().map_err(SftpError::Channel)?;

    Ok(SftpFs {
        sftp: Mutex::new(sftp),
        session,
        tcp,
        root: config.root.clone(),
        endpoint: config.endpoint(),
    })
}

fn timeout_ms(secs: u64) -> u32 {
    u32::try_from(secs.saturating_mul(1000)).unwrap_or(u32::MAX)
}

// ── Authentication ───────────────────────────────────────────────────────────

fn authenticate(session: &Session, config: &SftpEndpointConfig) -> Result<String, String> {
    let passphrase = config.private_key_passphrase.as_deref();

    // 1. Configured private key
    if let Some(ref key_path) = config.private_key_path {
        session
            .userauth_pubkey_file(&config.username, None, Path::new(key_path), passphrase)
            .map_err(|e| format!("public-key ({}) auth failed: {}", key_path, e))?;
        if session.authenticated() {
            return Ok("publickey".to_string());
        }
    }

    // 2. Default key paths when no password is configured
    if config.password.is_none() && config.private_key_path.is_none() {
        if let Some(ssh_dir) = dirs::home_dir().map(|h| h.join(".ssh")) {
            for name in &["id_ed25519", "id_rsa", "id_ecdsa"] {
                let path = ssh_dir.join(name);
                if path.exists()
                    && session
                        .userauth_pubkey_file(&config.username, None, &path, passphrase)
                        .is_ok()
                    && session.authenticated()
                {
                    return Ok(format!("publickey-default({})", name));
                }
            }
        }
    }

    // 3. Password, then keyboard-interactive with the same secret
    if let Some(ref password) = config.password {
        if session.userauth_password(&config.username, password).is_ok()
            && session.authenticated()
        {
            return Ok("password".to_string());
        }

        struct PasswordPrompt {
            password: String,
        }

        impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
            fn prompt(
                &mut self,
                _username: &str,
                _instructions: &str,
                prompts: &[ssh2::Prompt],
            ) -> Vec<String> {
                prompts.iter().map(|_| self.password.clone()).collect()
            }
        }

        let mut prompt = PasswordPrompt {
            password: password.clone(),
        };
        if session
            .userauth_keyboard_interactive(&config.username, &mut prompt)
            .is_ok()
            && session.authenticated()
        {
            return Ok("keyboard-interactive".to_string());
        }
    }

    Err("no authentication method succeeded".to_string())
}

// ── Host key fingerprints ────────────────────────────────────────────────────

/// Compare a configured fingerprint against the server's host key hashes.
///
/// Accepted forms: `SHA256:<base64>` (padding optional), 64 hex digits of
/// SHA-256, or 32 hex digits of MD5 with or without `MD5:` prefix and `:`
/// separators. Hex comparison ignores case.
pub fn fingerprint_matches(expected: &str, sha256: Option<&[u8]>, md5: Option<&[u8]>) -> bool {
    let expected = expected.trim();
    if let Some(b64) = strip_prefix_ignore_case(expected, "sha256:") {
        let wanted = b64.trim_end_matches('=');
        return sha256.map(|h| STANDARD_NO_PAD.encode(h) == wanted).unwrap_or(false);
    }

    let body = strip_prefix_ignore_case(expected, "md5:").unwrap_or(expected);
    let digits = body
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase();
    match digits.len() {
        32 => md5.map(|h| hex::encode(h) == digits).unwrap_or(false),
        64 => sha256.map(|h| hex::encode(h) == digits).unwrap_or(false),
        _ => false,
    }
}

fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        text.get(prefix.len()..)
    } else {
        None
    }
}

// ── Paths ────────────────────────────────────────────────────────────────────

/// Absolute server path for `path` below `root`. Leading slashes in `path`
/// do not escape the root.
pub fn resolve(root: &str, path: &str) -> String {
    let root = root.trim_end_matches('/');
    let rel = path.trim_matches('/');
    match (root.is_empty(), rel.is_empty()) {
        (true, true) => "/".to_string(),
        (true, false) => format!("/{}", rel),
        (false, true) => root.to_string(),
        (false, false) => format!("{}/{}", root, rel),
    }
}

/// Every ancestor directory of `path`, outermost first, excluding `/`.
fn parent_dirs(path: &str) -> Vec<String> {
    let mut dirs = Vec::new();
    let Some((parent, _)) = path.rsplit_once('/') else {
        return dirs;
    };
    let mut current = String::new();
    for part in parent.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        dirs.push(current.clone());
    }
    dirs
}

fn child_path(dir: &str, name: &str) -> String {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

// ── RemoteFs ─────────────────────────────────────────────────────────────────

#[async_trait]
impl RemoteFs for SftpFs {
    async fn list(&self, path: &str) -> FsResult<Vec<RemoteEntry>> {
        let remote = self.resolve(path);
        let sftp = self.channel();
        let raw = sftp.readdir(Path::new(&remote)).map_err(|e| op_error("list", path, e))?;

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for (entry_path, stat) in raw {
            let name = match entry_path.file_name() {
                Some(n) => n.to_string_lossy().to_string(),
                None => continue,
            };
            if name == "." || name == ".." {
                continue;
            }
            let rel = child_path(path, &name);
            if stat.is_dir() {
                dirs.push(RemoteEntry::directory(rel));
            } else {
                files.push(RemoteEntry::file(rel, stat.size.unwrap_or(0)));
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        dirs.sort_by(|a, b| a.path.cmp(&b.path));
        files.extend(dirs);
        Ok(files)
    }

    async fn read_stream(&self, path: &str, sink: &mut (dyn Write + Send)) -> FsResult<u64> {
        let remote = self.resolve(path);
        let sftp = self.channel();
        let mut file = sftp.open(Path::new(&remote)).map_err(|e| op_error("read", path, e))?;
        let n = std::io::copy(&mut file, sink)?;
        sink.flush()?;
        Ok(n)
    }

    async fn write_stream(&self, path: &str, source: &mut (dyn Read + Send)) -> FsResult<u64> {
        let remote = self.resolve(path);
        let sftp = self.channel();
        self.ensure_parent(&sftp, &remote);
        let mut file = sftp
            .open_mode(
                Path::new(&remote),
                OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE,
                FILE_MODE,
                OpenType::File,
            )
            .map_err(|e| op_error("write", path, e))?;
        let n = std::io::copy(source, &mut file)?;
        file.flush()?;
        Ok(n)
    }

    async fn delete(&self, path: &str) -> FsResult<()> {
        let remote = self.resolve(path);
        self.channel()
            .unlink(Path::new(&remote))
            .map_err(|e| op_error("delete", path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let src = self.resolve(from);
        let dst = self.resolve(to);
        let sftp = self.channel();
        self.ensure_parent(&sftp, &dst);
        sftp.rename(
            Path::new(&src),
            Path::new(&dst),
            Some(RenameFlags::OVERWRITE | RenameFlags::ATOMIC | RenameFlags::NATIVE),
        )
        .map_err(|e| op_error("rename", from, e))
    }
}
