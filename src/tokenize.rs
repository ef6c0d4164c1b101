//! Code-aware tokenization for the full-text indices.
//!
//! Raw text is split on whitespace and code punctuation; each surviving
//! fragment is broken at `_` and camelCase boundaries. Sub-words, compound
//! segments, and the whole fragment are all emitted (so `getUserName` is
//! findable via `get`, `user`, `name`, or `getusername`), minus stop words,
//! single characters, and bare numbers.

/// Characters that terminate a fragment, in addition to whitespace.
fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')'
                | '['
                | ']'
                | '{'
                | '}'
                | '<'
                | '>'
                | ','
                | ':'
                | ';'
                | '='
                | '+'
                | '-'
                | '*'
                | '/'
                | '&'
                | '|'
                | '!'
                | '?'
                | '@'
                | '#'
                | '$'
                | '%'
                | '^'
                | '~'
                | '`'
                | '"'
                | '\''
                | '\\'
        )
}

/// Common source-language keywords and English function words, filtered from
/// every index. Deliberately does not contain short identifier words like
/// `by` or `id` that appear in real symbol names.
fn is_stop_word(s: &str) -> bool {
    matches!(
        s,
        // source keywords
        "if" | "else" | "elif" | "for" | "while" | "do" | "return" | "class" | "function"
            | "import" | "export" | "async" | "await" | "try" | "catch" | "finally" | "const"
            | "let" | "var" | "def" | "fn" | "pub" | "use" | "mod" | "struct" | "enum" | "impl"
            | "trait" | "match" | "loop" | "break" | "continue" | "new" | "this" | "self"
            | "super" | "static" | "void" | "switch" | "case" | "default" | "throw" | "throws"
            | "extends" | "implements" | "interface" | "package" | "namespace" | "public"
            | "private" | "protected" | "typeof" | "instanceof" | "delete" | "yield" | "lambda"
            | "pass" | "raise" | "except" | "global" | "nonlocal" | "assert" | "true" | "false"
            | "null" | "none" | "nil" | "undefined" | "in" | "is" | "as" | "not" | "and" | "or"
            // English function words
            | "the" | "an" | "of" | "to" | "at" | "on" | "it" | "be" | "been" | "was" | "were"
            | "are" | "has" | "have" | "had" | "will" | "would" | "can" | "could" | "should"
            | "may" | "might" | "must" | "that" | "than" | "then" | "them" | "they" | "their"
            | "there" | "these" | "those" | "some" | "such" | "from" | "into" | "over" | "under"
            | "about" | "each" | "every" | "all" | "any" | "both" | "more" | "most" | "other"
            | "same" | "so" | "too" | "very" | "just" | "also" | "but" | "only" | "own" | "out"
            | "up" | "down" | "here" | "where" | "when" | "why" | "how" | "what" | "which"
            | "who" | "no" | "yes" | "does" | "did" | "we" | "us" | "our" | "you" | "your"
            | "me" | "my" | "he" | "she" | "his" | "her" | "its" | "with"
    )
}

/// A piece survives if it is at least two characters, not purely numeric,
/// and not a stop word.
fn accept(s: &str) -> bool {
    s.len() >= 2 && !s.bytes().all(|b| b.is_ascii_digit()) && !is_stop_word(s)
}

/// Split a segment at camelCase boundaries: every lower->Upper transition and
/// every UPPER-run boundary where the run is followed by a lowercase letter
/// (`XMLParser` -> `XML`, `Parser`).
fn split_camel(segment: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = segment.char_indices().collect();
    let mut cuts = vec![0usize];
    for i in 1..chars.len() {
        let (byte_idx, c) = chars[i];
        let prev = chars[i - 1].1;
        let boundary = (prev.is_lowercase() && c.is_uppercase())
            || (prev.is_uppercase()
                && c.is_uppercase()
                && chars.get(i + 1).map(|(_, n)| n.is_lowercase()).unwrap_or(false));
        if boundary {
            cuts.push(byte_idx);
        }
    }
    cuts.push(segment.len());
    cuts.windows(2).map(|w| &segment[w[0]..w[1]]).filter(|p| !p.is_empty()).collect()
}

/// Tokenize one fragment (a run of non-separator characters) into the output
/// vector. Emits, per `_`-separated segment, the lowercased segment plus its
/// camelCase pieces, and finally the whole lowercased fragment when it is not
/// already covered by a single emission.
fn tokenize_fragment(fragment: &str, out: &mut Vec<String>) {
    let mut emitted_here: Vec<String> = Vec::new();

    for segment in fragment.split('_').filter(|s| !s.is_empty()) {
        let pieces = split_camel(segment);
        let segment_lower = segment.to_lowercase();
        if pieces.len() > 1 {
            if accept(&segment_lower) {
                emitted_here.push(segment_lower);
            }
            for piece in pieces {
                let lower = piece.to_lowercase();
                if accept(&lower) {
                    emitted_here.push(lower);
                }
            }
        } else if accept(&segment_lower) {
            emitted_here.push(segment_lower);
        }
    }

    let fragment_lower = fragment.to_lowercase();
    if accept(&fragment_lower) && !emitted_here.contains(&fragment_lower) {
        emitted_here.push(fragment_lower);
    }

    out.extend(emitted_here);
}

/// Tokenize raw text into the ordered token sequence used for TF counting.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for fragment in text.split(is_separator).filter(|f| !f.is_empty()) {
        tokenize_fragment(fragment, &mut out);
    }
    out
}
