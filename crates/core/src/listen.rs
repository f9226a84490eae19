//! Parsing and binding of the two listen-address forms accepted by every
//! flag in the CLI flags table: `host:port` for TCP, `unix://path` for a
//! Unix domain socket.

use std::fmt;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use tokio::net::{TcpListener, UnixListener};

const UNIX_SOCKET_MODE: u32 = 0o775;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Address {
	Tcp(String),
	Unix(PathBuf),
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Address::Tcp(addr) => write!(f, "{addr}"),
			Address::Unix(path) => write!(f, "unix://{}", path.display()),
		}
	}
}

impl Address {
	/// Parse a listen address of the form `host:port` or `unix://path`.
	pub fn parse(raw: &str) -> anyhow::Result<Address> {
		match raw.strip_prefix("unix://") {
			Some(path) => {
				if path.is_empty() {
					anyhow::bail!("unix socket address must name a path: {raw}");
				}
				Ok(Address::Unix(PathBuf::from(path)))
			},
			None => {
				if raw.is_empty() {
					anyhow::bail!("listen address must not be empty");
				}
				Ok(Address::Tcp(raw.to_string()))
			},
		}
	}
}

pub enum Listener {
	Tcp(TcpListener),
	Unix(UnixListener),
}

impl Listener {
	/// Bind the given address. For a Unix socket, any stale file at the path
	/// is removed first and the new socket is chmod'd to 0o775 so a sibling
	/// proxy process running under the same group can connect.
	pub async fn bind(addr: &Address) -> anyhow::Result<Listener> {
		match addr {
			Address::Tcp(a) => {
				let listener = TcpListener::bind(a).await?;
				Ok(Listener::Tcp(listener))
			},
			Address::Unix(path) => {
				if path.exists() {
					std::fs::remove_file(path)?;
				}
				if let Some(parent) = path.parent() {
					if !parent.as_os_str().is_empty() {
						std::fs::create_dir_all(parent)?;
					}
				}
				let listener = UnixListener::bind(path)?;
				let perms = std::fs::Permissions::from_mode(UNIX_SOCKET_MODE);
				std::fs::set_permissions(path, perms)?;
				Ok(Listener::Unix(listener))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_tcp_form() {
		assert_eq!(Address::parse(":1063").unwrap(), Address::Tcp(":1063".into()));
		assert_eq!(
			Address::parse("127.0.0.1:9901").unwrap(),
			Address::Tcp("127.0.0.1:9901".into())
		);
	}

	#[test]
	fn parses_unix_form() {
		assert_eq!(
			Address::parse("unix:///tmp/x.sock").unwrap(),
			Address::Unix(PathBuf::from("/tmp/x.sock"))
		);
	}

	#[test]
	fn rejects_empty_unix_path() {
		assert!(Address::parse("unix://").is_err());
	}

	#[tokio::test]
	async fn binds_unix_socket_with_expected_mode_and_removes_stale_file() {
		let dir = std::env::temp_dir().join(format!("extproc-core-test-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let sock_path = dir.join("test.sock");
		std::fs::write(&sock_path, b"stale").unwrap();

		let addr = Address::Unix(sock_path.clone());
		let _listener = Listener::bind(&addr).await.unwrap();

		let meta = std::fs::metadata(&sock_path).unwrap();
		assert_eq!(meta.permissions().mode() & 0o777, UNIX_SOCKET_MODE);

		std::fs::remove_file(&sock_path).ok();
		std::fs::remove_dir(&dir).ok();
	}
}
