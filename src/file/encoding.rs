use std::fmt;

/// Precompressed variants a file service looks for next to a requested file.
///
/// Declaration order is the selection priority: when a client accepts several
/// encodings, the first one listed here that exists on the backend wins, no
/// matter how the client ordered or weighted its `accept-encoding` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ContentEncoding {
    Brotli,
    Gzip,
}

impl ContentEncoding {
    pub const ALL: [ContentEncoding; 2] = [ContentEncoding::Brotli, ContentEncoding::Gzip];

    /// File name suffix of the precompressed variant.
    pub fn extension(self) -> &'static str {
        match self {
            ContentEncoding::Brotli => ".br",
            ContentEncoding::Gzip => ".gz",
        }
    }

    /// Value used in `accept-encoding` and `content-encoding` headers.
    pub fn header_value(self) -> &'static str {
        match self {
            ContentEncoding::Brotli => "br",
            ContentEncoding::Gzip => "gzip",
        }
    }

    /// Parses a raw `accept-encoding` value into the supported encodings, in
    /// priority order.
    ///
    /// Each comma-separated token is matched by case-insensitive substring
    /// containment. Quality values and `*` are not interpreted.
    pub fn parse_accepted(accept_encoding: &str) -> Vec<ContentEncoding> {
        let mut accepted = [false; Self::ALL.len()];
        for token in accept_encoding.split(',') {
            let token = token.to_ascii_lowercase();
            for (i, encoding) in Self::ALL.iter().enumerate() {
                if token.contains(encoding.header_value()) {
                    accepted[i] = true;
                }
            }
        }
        Self::ALL
            .iter()
            .zip(accepted)
            .filter_map(|(encoding, ok)| ok.then_some(*encoding))
            .collect()
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value())
    }
}
