//! Unified diff of two texts, line by line
//!
//! Uses Myers' shortest-edit-script algorithm after stripping the common
//! prefix and suffix, which keeps the search small for page revisions.

/// Labels used when the caller does not name the two versions
const OLD_LABEL: &str = "Version 1";
const NEW_LABEL: &str = "Version 2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal(usize, usize),
    Delete(usize),
    Insert(usize),
}

/// One output line with the number of old/new lines that precede it
struct Line<'a> {
    tag: char,
    text: &'a str,
    old_pos: usize,
    new_pos: usize,
}

/// Produces a unified diff between two texts
///
/// # Arguments
///
/// * `old` - The earlier text
/// * `new` - The later text
/// * `context` - Unchanged lines shown around each change
///
/// # Returns
///
/// The diff, or an empty string when the texts have the same lines
///
/// # Examples
///
/// ```
/// use archive_dispatch::output::unified_diff;
///
/// let diff = unified_diff("a\nb\nc", "a\nB\nc", 1);
/// assert_eq!(diff, "--- Version 1\n+++ Version 2\n@@ -1,3 +1,3 @@\n a\n-b\n+B\n c");
/// ```
pub fn unified_diff(old: &str, new: &str, context: usize) -> String {
    unified_diff_labeled(old, new, OLD_LABEL, NEW_LABEL, context)
}

/// Like [`unified_diff`], with custom labels for the `---`/`+++` lines
pub fn unified_diff_labeled(
    old: &str,
    new: &str,
    old_label: &str,
    new_label: &str,
    context: usize,
) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let lines = annotate(&a, &b, &edit_script(&a, &b));

    let changes: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.tag != ' ')
        .map(|(i, _)| i)
        .collect();
    if changes.is_empty() {
        return String::new();
    }

    // Group changes whose context windows touch
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    for &change in &changes {
        let start = change.saturating_sub(context);
        let end = (change + context + 1).min(lines.len());
        match hunks.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => hunks.push((start, end)),
        }
    }

    let mut out = vec![format!("--- {}", old_label), format!("+++ {}", new_label)];
    for (start, end) in hunks {
        let hunk = &lines[start..end];
        let old_len = hunk.iter().filter(|l| l.tag != '+').count();
        let new_len = hunk.iter().filter(|l| l.tag != '-').count();
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(hunk[0].old_pos, old_len),
            format_range(hunk[0].new_pos, new_len)
        ));
        out.extend(hunk.iter().map(|line| format!("{}{}", line.tag, line.text)));
    }
    out.join("\n")
}

/// Formats a hunk range the way `diff -u` does
fn format_range(start: usize, length: usize) -> String {
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

/// Turns the edit script into output lines, deletions before insertions
/// within each changed run
fn annotate<'a>(a: &[&'a str], b: &[&'a str], ops: &[Op]) -> Vec<Line<'a>> {
    let mut lines = Vec::with_capacity(ops.len());
    let mut old_pos = 0;
    let mut new_pos = 0;
    let mut deleted: Vec<usize> = Vec::new();
    let mut inserted: Vec<usize> = Vec::new();

    let flush = |lines: &mut Vec<Line<'a>>,
                 deleted: &mut Vec<usize>,
                 inserted: &mut Vec<usize>,
                 old_pos: &mut usize,
                 new_pos: &mut usize| {
        for i in deleted.drain(..) {
            lines.push(Line {
                tag: '-',
                text: a[i],
                old_pos: *old_pos,
                new_pos: *new_pos,
            });
            *old_pos += 1;
        }
        for j in inserted.drain(..) {
            lines.push(Line {
                tag: '+',
                text: b[j],
                old_pos: *old_pos,
                new_pos: *new_pos,
            });
            *new_pos += 1;
        }
    };

    for op in ops {
        match *op {
            Op::Delete(i) => deleted.push(i),
            Op::Insert(j) => inserted.push(j),
            Op::Equal(i, _) => {
                flush(&mut lines, &mut deleted, &mut inserted, &mut old_pos, &mut new_pos);
                lines.push(Line {
                    tag: ' ',
                    text: a[i],
                    old_pos,
                    new_pos,
                });
                old_pos += 1;
                new_pos += 1;
            }
        }
    }
    flush(&mut lines, &mut deleted, &mut inserted, &mut old_pos, &mut new_pos);
    lines
}

/// Shortest edit script from `a` to `b`
fn edit_script(a: &[&str], b: &[&str]) -> Vec<Op> {
    let prefix = a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut ops: Vec<Op> = (0..prefix).map(|i| Op::Equal(i, i)).collect();
    let middle = myers(&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);
    ops.extend(middle.into_iter().map(|op| match op {
        Op::Equal(i, j) => Op::Equal(i + prefix, j + prefix),
        Op::Delete(i) => Op::Delete(i + prefix),
        Op::Insert(j) => Op::Insert(j + prefix),
    }));
    ops.extend((0..suffix).map(|s| Op::Equal(a.len() - suffix + s, b.len() - suffix + s)));
    ops
}

fn myers(a: &[&str], b: &[&str]) -> Vec<Op> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max = (n + m) as usize;
    let offset = max as isize;
    let mut v = vec![0isize; 2 * max + 2];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    let goes_down = |v: &[isize], k: isize, d: isize| {
        let idx = (k + offset) as usize;
        k == -d || (k != d && v[idx - 1] < v[idx + 1])
    };

    'search: for d in 0..=max as isize {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if goes_down(&v, k, d) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'search;
            }
            k += 2;
        }
    }

    let mut ops = Vec::new();
    let (mut x, mut y) = (n, m);
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if goes_down(v, k, d) { k + 1 } else { k - 1 };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            ops.push(Op::Equal((x - 1) as usize, (y - 1) as usize));
            x -= 1;
            y -= 1;
        }
        if d > 0 {
            if x == prev_x {
                ops.push(Op::Insert((y - 1) as usize));
            } else {
                ops.push(Op::Delete((x - 1) as usize));
            }
        }
        x = prev_x;
        y = prev_y;
    }

    ops.reverse();
    ops
}
