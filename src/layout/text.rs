use crate::measure::{TextMeasure, is_wide};
use crate::model::FontSpec;

const EPS: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub width: f64,
}

#[derive(Clone, Copy, PartialEq)]
enum TokenKind {
    Word,
    Space,
}

struct Token<'a> {
    text: &'a str,
    kind: TokenKind,
}

/// Wide characters are tokens of their own so a line may break after any of
/// them; everything else groups into words and whitespace runs.
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut current: Option<TokenKind> = None;
    for (i, ch) in line.char_indices() {
        let kind = if ch.is_whitespace() {
            TokenKind::Space
        } else {
            TokenKind::Word
        };
        if is_wide(ch) {
            if let Some(kind) = current.take() {
                tokens.push(Token {
                    text: &line[start..i],
                    kind,
                });
            }
            let end = i + ch.len_utf8();
            tokens.push(Token {
                text: &line[i..end],
                kind: TokenKind::Word,
            });
            start = end;
            continue;
        }
        match current {
            Some(k) if k == kind => {}
            Some(k) => {
                tokens.push(Token {
                    text: &line[start..i],
                    kind: k,
                });
                start = i;
                current = Some(kind);
            }
            None => {
                start = i;
                current = Some(kind);
            }
        }
    }
    if let Some(kind) = current {
        tokens.push(Token {
            text: &line[start..],
            kind,
        });
    }
    tokens
}

struct LineBuilder<'m> {
    measure: &'m dyn TextMeasure,
    font: &'m FontSpec,
    letter_spacing: f64,
    lines: Vec<TextLine>,
    text: String,
    width: f64,
}

impl LineBuilder<'_> {
    fn width_of(&self, s: &str) -> f64 {
        s.chars()
            .map(|ch| self.measure.advance(ch, self.font) + self.letter_spacing)
            .sum()
    }

    fn finish(&mut self) {
        let trimmed = self.text.trim_end();
        let width = if trimmed.len() == self.text.len() {
            self.width
        } else {
            self.width_of(trimmed)
        };
        self.lines.push(TextLine {
            text: trimmed.to_string(),
            width,
        });
        self.text.clear();
        self.width = 0.0;
    }

    fn push(&mut self, s: &str, w: f64) {
        self.text.push_str(s);
        self.width += w;
    }
}

/// Greedy line breaking of `text` into lines no wider than `max_width`.
/// `\n` always starts a new line; a word wider than a full line is split
/// between characters.
pub fn wrap_lines(
    text: &str,
    font: &FontSpec,
    letter_spacing: f64,
    max_width: f64,
    measure: &dyn TextMeasure,
) -> Vec<TextLine> {
    let mut b = LineBuilder {
        measure,
        font,
        letter_spacing,
        lines: Vec::new(),
        text: String::new(),
        width: 0.0,
    };
    if text.is_empty() {
        return b.lines;
    }

    for source_line in text.split('\n') {
        for token in tokenize(source_line.trim_end_matches('\r')) {
            let w = b.width_of(token.text);
            if token.kind == TokenKind::Space {
                // Leading whitespace after a wrap is dropped.
                if !b.text.is_empty() {
                    b.push(token.text, w);
                }
                continue;
            }
            if b.width + w <= max_width + EPS {
                b.push(token.text, w);
                continue;
            }
            if !b.text.is_empty() {
                b.finish();
            }
            if w <= max_width + EPS {
                b.push(token.text, w);
                continue;
            }
            for ch in token.text.chars() {
                let cw = b.width_of(ch.encode_utf8(&mut [0; 4]));
                if !b.text.is_empty() && b.width + cw > max_width + EPS {
                    b.finish();
                }
                b.text.push(ch);
                b.width += cw;
            }
        }
        b.finish();
    }
    b.lines
}
