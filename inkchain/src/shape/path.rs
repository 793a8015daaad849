//! Parser for the restricted SVG path grammar.
//!
//! The grammar covers exactly the command set {M, m, L, l, H, h, V, v,
//! Z, z} with decimal integer operands. Tokens are whitespace-separated:
//! a token is either a single command letter or an integer (optional
//! leading `-`). Coordinate commands accept one or more argument groups
//! of their arity, SVG-style; extra groups after `M`/`m` are implicit
//! line-tos. A path must begin with a move-to.
//!
//! Parsing produces pen geometry only; bounds checking and pixel
//! coverage live in [`super::raster`].

use super::ShapeError;

/// One continuous run of the pen.
///
/// `start` is the move-to that opened the subpath; `points` are the
/// successive pen positions. `closed_explicitly` records a `Z`/`z`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SubPath {
    pub start: (i64, i64),
    pub points: Vec<(i64, i64)>,
    pub closed_explicitly: bool,
}

impl SubPath {
    fn open(start: (i64, i64)) -> Self {
        Self {
            start,
            points: Vec::new(),
            closed_explicitly: false,
        }
    }

    /// All vertices of the subpath, starting with the move-to point.
    pub fn vertices(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        std::iter::once(self.start).chain(self.points.iter().copied())
    }

    /// `true` when the subpath draws at least one segment.
    pub fn has_segments(&self) -> bool {
        !self.points.is_empty() || self.closed_explicitly
    }

    /// A subpath is closed by an explicit `Z` or by the pen returning to
    /// its start point.
    pub fn is_closed(&self) -> bool {
        self.closed_explicitly || self.points.last() == Some(&self.start)
    }
}

/// Returns the normalized form of `path`: tokens joined by single spaces.
///
/// The shape fingerprint is computed over this form so that insignificant
/// whitespace does not mint distinct shapes.
pub fn normalize(path: &str) -> String {
    path.split_whitespace().collect::<Vec<_>>().join(" ")
}

enum Token {
    Cmd(char),
    Num(i64),
}

fn tokenize(path: &str) -> Result<Vec<Token>, ShapeError> {
    let mut tokens = Vec::new();
    for raw in path.split_whitespace() {
        let mut chars = raw.chars();
        let first = chars.next().expect("split_whitespace yields non-empty");
        if chars.as_str().is_empty() && matches!(first, 'M' | 'm' | 'L' | 'l' | 'H' | 'h' | 'V' | 'v' | 'Z' | 'z')
        {
            tokens.push(Token::Cmd(first));
        } else if let Ok(n) = raw.parse::<i64>() {
            tokens.push(Token::Num(n));
        } else {
            return Err(ShapeError::InvalidPath(path.to_string()));
        }
    }
    Ok(tokens)
}

/// Parses `path` into subpaths of integer pen positions.
pub fn parse(path: &str) -> Result<Vec<SubPath>, ShapeError> {
    let tokens = tokenize(path)?;
    if tokens.is_empty() {
        return Err(ShapeError::InvalidPath(path.to_string()));
    }

    let invalid = || ShapeError::InvalidPath(path.to_string());

    let mut done: Vec<SubPath> = Vec::new();
    let mut current: Option<SubPath> = None;
    let mut pen: Option<(i64, i64)> = None;

    let mut iter = tokens.into_iter().peekable();

    // Pulls the next integer operand, failing on a command or exhaustion.
    fn next_num(
        iter: &mut std::iter::Peekable<std::vec::IntoIter<Token>>,
    ) -> Option<i64> {
        match iter.peek() {
            Some(Token::Num(_)) => match iter.next() {
                Some(Token::Num(n)) => Some(n),
                _ => unreachable!(),
            },
            _ => None,
        }
    }

    while let Some(token) = iter.next() {
        let cmd = match token {
            Token::Cmd(c) => c,
            // A bare number with no preceding command.
            Token::Num(_) => return Err(invalid()),
        };

        if pen.is_none() && !matches!(cmd, 'M' | 'm') {
            // Every path opens with a move-to.
            return Err(invalid());
        }

        match cmd {
            'M' | 'm' => {
                let (x, y) = match (next_num(&mut iter), next_num(&mut iter)) {
                    (Some(x), Some(y)) => (x, y),
                    _ => return Err(invalid()),
                };
                let base = pen.unwrap_or((0, 0));
                let target = if cmd == 'm' { (base.0 + x, base.1 + y) } else { (x, y) };

                if let Some(sub) = current.take() {
                    done.push(sub);
                }
                current = Some(SubPath::open(target));
                pen = Some(target);

                // Further coordinate pairs are implicit line-tos.
                while matches!(iter.peek(), Some(Token::Num(_))) {
                    let (x, y) = match (next_num(&mut iter), next_num(&mut iter)) {
                        (Some(x), Some(y)) => (x, y),
                        _ => return Err(invalid()),
                    };
                    let p = pen.expect("pen set by move-to");
                    let target = if cmd == 'm' { (p.0 + x, p.1 + y) } else { (x, y) };
                    current.as_mut().expect("subpath open").points.push(target);
                    pen = Some(target);
                }
            }

            'L' | 'l' | 'H' | 'h' | 'V' | 'v' => {
                let arity = if matches!(cmd, 'L' | 'l') { 2 } else { 1 };
                let mut groups = 0usize;
                loop {
                    if !matches!(iter.peek(), Some(Token::Num(_))) {
                        break;
                    }
                    let p = pen.expect("pen checked above");
                    let target = if arity == 2 {
                        let (x, y) = match (next_num(&mut iter), next_num(&mut iter)) {
                            (Some(x), Some(y)) => (x, y),
                            _ => return Err(invalid()),
                        };
                        if cmd == 'l' { (p.0 + x, p.1 + y) } else { (x, y) }
                    } else {
                        let n = next_num(&mut iter).ok_or_else(invalid)?;
                        match cmd {
                            'H' => (n, p.1),
                            'h' => (p.0 + n, p.1),
                            'V' => (p.0, n),
                            'v' => (p.0, p.1 + n),
                            _ => unreachable!(),
                        }
                    };

                    // A draw after a close continues from the close point
                    // in a fresh subpath.
                    let sub = current.get_or_insert_with(|| SubPath::open(p));
                    sub.points.push(target);
                    pen = Some(target);
                    groups += 1;
                }
                if groups == 0 {
                    return Err(invalid());
                }
            }

            'Z' | 'z' => {
                let mut sub = current.take().ok_or_else(invalid)?;
                sub.closed_explicitly = true;
                pen = Some(sub.start);
                done.push(sub);
            }

            _ => return Err(invalid()),
        }
    }

    if let Some(sub) = current.take() {
        done.push(sub);
    }
    Ok(done)
}
