//! Morse code decoder for intercepted submarine chatter.
//!
//! Decrypted communications arrive as Morse: symbols separated by single
//! spaces, words by triple spaces. The table covers A–Z, 0–9 and the
//! punctuation the traffic uses. Unknown symbols contribute nothing —
//! decoding is lossy, never fatal.

/// Fixed symbol table, Morse code → character.
const MORSE_TABLE: &[(&str, char)] = &[
    (".-", 'A'),
    ("-...", 'B'),
    ("-.-.", 'C'),
    ("-..", 'D'),
    (".", 'E'),
    ("..-.", 'F'),
    ("--.", 'G'),
    ("....", 'H'),
    ("..", 'I'),
    (".---", 'J'),
    ("-.-", 'K'),
    (".-..", 'L'),
    ("--", 'M'),
    ("-.", 'N'),
    ("---", 'O'),
    (".--.", 'P'),
    ("--.-", 'Q'),
    (".-.", 'R'),
    ("...", 'S'),
    ("-", 'T'),
    ("..-", 'U'),
    ("...-", 'V'),
    (".--", 'W'),
    ("-..-", 'X'),
    ("-.--", 'Y'),
    ("--..", 'Z'),
    (".----", '1'),
    ("..---", '2'),
    ("...--", '3'),
    ("....-", '4'),
    (".....", '5'),
    ("-....", '6'),
    ("--...", '7'),
    ("---..", '8'),
    ("----.", '9'),
    ("-----", '0'),
    (".-.-.-", '.'),
    ("--..-.", ','),
    ("..--..", '?'),
    ("-.-.--", '!'),
    ("-....-", '-'),
    ("-..-.", '/'),
    (".--.-", '@'),
    ("-.--.", '('),
    ("-.--.-", ')'),
    // The empty code (two adjacent separators) stands for a literal space
    ("", ' '),
];

fn lookup(code: &str) -> Option<char> {
    MORSE_TABLE.iter().find(|(c, _)| *c == code).map(|(_, ch)| *ch)
}

/// Decode a Morse-coded line into plain text.
///
/// Words are separated by three spaces, symbols within a word by one; a
/// double space inside a word is the empty code and decodes to a literal
/// space. Leading/trailing whitespace is trimmed (the emitting side pads
/// symbols with trailing spaces). Unknown codes are skipped; empty input
/// yields an empty string.
pub fn decode(morse: &str) -> String {
    let trimmed = morse.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    trimmed
        .split("   ")
        .map(|word| {
            word.split(' ').filter_map(lookup).collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(" ")
}
