//! A file-backed [`CookieStore`].
//!
//! Reads scan the backing file in fixed-size buffer windows rather than
//! loading it whole, carrying a partial trailing line over to the next
//! window. Writes copy every record that survives a mutation to a fresh
//! temp file, then atomically rename it over the live file, so a reader
//! never observes a half-written file. Both paths run under a
//! [`parking_lot::ReentrantMutex`] so a store method can call another
//! store method on the same thread (e.g. a future `get`-then-`set`
//! convenience) without deadlocking.

use super::jar::{domain_matches, path_matches, Cookie, CookieStore};
use parking_lot::ReentrantMutex;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Size of each read window when scanning the cookie file.
const SCAN_WINDOW: usize = 16 * 1024;

pub struct FileCookieStore {
    path: PathBuf,
    guard: ReentrantMutex<()>,
}

impl FileCookieStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: ReentrantMutex::new(()),
        }
    }

    /// Scans the backing file, calling `each` with every successfully
    /// parsed record. Missing file is treated as empty.
    fn scan(&self, mut each: impl FnMut(Cookie)) -> io::Result<()> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };

        let mut window = vec![0u8; SCAN_WINDOW];
        let mut carry: Vec<u8> = Vec::new();
        loop {
            let n = file.read(&mut window)?;
            if n == 0 {
                break;
            }
            carry.extend_from_slice(&window[..n]);

            let mut consumed_to = 0;
            while let Some(rel_nl) = carry[consumed_to..].iter().position(|&b| b == b'\n') {
                let line_end = consumed_to + rel_nl;
                let line = std::str::from_utf8(&carry[consumed_to..line_end]).unwrap_or("");
                if let Some(cookie) = Cookie::from_line(line.trim_end_matches('\r')) {
                    each(cookie);
                }
                consumed_to = line_end + 1;
            }
            carry.drain(..consumed_to);
        }
        if !carry.is_empty() {
            if let Ok(line) = std::str::from_utf8(&carry) {
                if let Some(cookie) = Cookie::from_line(line.trim_end_matches('\r')) {
                    each(cookie);
                }
            }
        }
        Ok(())
    }

    /// Replaces the backing file's contents with `lines`, one per line,
    /// via a temp file in the same directory followed by an atomic rename.
    fn replace_all(&self, lines: &[String]) -> io::Result<()> {
        let tmp_path = tmp_path_for(&self.path);
        {
            let mut tmp = File::create(&tmp_path)?;
            for line in lines {
                tmp.write_all(line.as_bytes())?;
                tmp.write_all(b"\n")?;
            }
            tmp.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

impl CookieStore for FileCookieStore {
    fn get(&self, host: &str, path: &str, is_tls: bool, emit: &mut dyn FnMut(&str, &str)) {
        let _lock = self.guard.lock();
        let now = SystemTime::now();
        let _ = self.scan(|cookie| {
            if domain_matches(&cookie.domain, host)
                && path_matches(&cookie.path, path)
                && (is_tls || !cookie.secure)
                && !cookie.is_expired(now)
            {
                emit(&cookie.name, &cookie.value);
            }
        });
    }

    fn set(&self, host: &str, set_cookie: &str) {
        let Some(new_cookie) = Cookie::parse(host, set_cookie) else {
            return;
        };
        let _lock = self.guard.lock();

        let mut kept = Vec::new();
        let _ = self.scan(|cookie| {
            let same_identity = cookie.name == new_cookie.name
                && cookie.domain.eq_ignore_ascii_case(&new_cookie.domain)
                && cookie.path == new_cookie.path;
            if !same_identity {
                kept.push(cookie);
            }
        });

        let now = SystemTime::now();
        if !new_cookie.is_expired(now) || new_cookie.is_session() {
            kept.push(new_cookie);
        }
        // an explicitly already-expired Set-Cookie (the standard deletion
        // idiom) deletes the prior record by simply not re-adding it.

        let lines: Vec<String> = kept.iter().map(Cookie::to_line).collect();
        let _ = self.replace_all(&lines);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("corehttp-cookie-test-{name}-{:?}", std::thread::current().id()));
        let _ = fs::remove_file(&p);
        p
    }

    fn collect(store: &FileCookieStore, host: &str, path: &str, is_tls: bool) -> Vec<(String, String)> {
        let mut out = Vec::new();
        store.get(host, path, is_tls, &mut |n, v| out.push((n.to_string(), v.to_string())));
        out
    }

    #[test]
    fn set_then_get_round_trips_and_respects_domain() {
        let path = temp_file("roundtrip");
        let store = FileCookieStore::new(&path);

        store.set("example.org", "sid=abc; Path=/; Domain=example.org");

        assert_eq!(collect(&store, "example.org", "/anything", false), vec![("sid".to_string(), "abc".to_string())]);
        assert!(collect(&store, "other.org", "/", false).is_empty());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn secure_cookie_withheld_over_plaintext() {
        let path = temp_file("secure");
        let store = FileCookieStore::new(&path);
        store.set("example.org", "sid=abc; Path=/; Secure");

        assert!(collect(&store, "example.org", "/", false).is_empty());
        assert_eq!(collect(&store, "example.org", "/", true).len(), 1);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn re_setting_same_cookie_replaces_value() {
        let path = temp_file("replace");
        let store = FileCookieStore::new(&path);
        store.set("example.org", "sid=abc; Path=/");
        store.set("example.org", "sid=def; Path=/");

        assert_eq!(collect(&store, "example.org", "/", false), vec![("sid".to_string(), "def".to_string())]);

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn many_records_survive_windowed_scan() {
        let path = temp_file("many");
        let store = FileCookieStore::new(&path);
        for i in 0..500 {
            store.set("example.org", &format!("c{i}=v{i}; Path=/"));
        }
        assert_eq!(collect(&store, "example.org", "/", false).len(), 500);

        let _ = fs::remove_file(&path);
    }
}
