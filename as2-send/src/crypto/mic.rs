//! Message Integrity Check computation.

use as2_types::{BodyPart, Mic, SigningAlgorithm};

/// Compute the MIC over a body part.
///
/// The digest input is the part's canonical MIME bytes: with
/// `include_headers`, the CRLF-canonicalized header block, a blank line
/// and the content; otherwise the content alone. Headers must be included
/// whenever the partnership signs, encrypts or compresses (RFC 4130
/// §7.3.1, RFC 5402 §4.1) - for signed messages the receiver digests the
/// exact bytes that were signed, and for encrypted or compressed ones the
/// plaintext MIME including its headers and transfer encoding. Only a
/// bare unsigned, unencrypted message digests content alone, because
/// intermediaries may reorder its headers.
///
/// The MIC's algorithm identifier follows the naming scheme the
/// partnership asked for (`sha256` under RFC 3851 naming, `sha-256`
/// under RFC 5751).
pub fn calculate_mic(
    part: &BodyPart,
    algorithm: SigningAlgorithm,
    include_headers: bool,
    rfc3851_mic_names: bool,
) -> Mic {
    let input = part.canonical_bytes(include_headers);
    let digest = algorithm.digest(&input);
    Mic::new(digest, algorithm.id(rfc3851_mic_names))
}
