use std::io::{self, Write};

/// Single line `[===   ] (3/6 sec)` progress indicator
///
/// Every [ProgressBar::render] overwrites the previous one,
/// [ProgressBar::finish] terminates the line.
pub struct ProgressBar<W: Write> {
    out: W,
}

impl ProgressBar<io::Stdout> {
    pub fn stdout() -> Self {
        ProgressBar::new(io::stdout())
    }
}

impl<W: Write> ProgressBar<W> {
    pub fn new(out: W) -> Self {
        ProgressBar { out }
    }

    /// Text of the bar for tick `current` (zero based) out of `total`
    pub fn format(current: u32, total: u32) -> String {
        let filled = current.saturating_add(1).min(total) as usize;
        format!(
            "[{}{}] ({}/{} sec)",
            "=".repeat(filled),
            " ".repeat(total as usize - filled),
            current.saturating_add(1).min(total),
            total
        )
    }

    pub fn render(&mut self, current: u32, total: u32) -> io::Result<()> {
        write!(self.out, "\r{}", Self::format(current, total))?;
        self.out.flush()
    }

    pub fn finish(&mut self) -> io::Result<()> {
        writeln!(self.out)?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_pad_counts() {
        for total in [1u32, 4, 10] {
            for i in 0..total {
                let bar = ProgressBar::<Vec<u8>>::format(i, total);
                let inner = &bar[1..bar.find(']').unwrap()];
                assert_eq!(inner.len(), total as usize);
                assert_eq!(inner.matches('=').count(), (i + 1) as usize);
                assert_eq!(
                    inner.matches(' ').count(),
                    (total - i - 1) as usize
                );
            }
        }
    }

    #[test]
    fn test_format() {
        assert_eq!(ProgressBar::<Vec<u8>>::format(0, 4), "[=   ] (1/4 sec)");
        assert_eq!(ProgressBar::<Vec<u8>>::format(3, 4), "[====] (4/4 sec)");
        // out of range ticks saturate
        assert_eq!(ProgressBar::<Vec<u8>>::format(7, 4), "[====] (4/4 sec)");
    }

    #[test]
    fn test_render_overwrites_line() {
        let mut bar = ProgressBar::new(Vec::new());
        bar.render(0, 2).unwrap();
        bar.render(1, 2).unwrap();
        bar.finish().unwrap();
        let out = String::from_utf8(bar.into_inner()).unwrap();
        assert_eq!(out, "\r[= ] (1/2 sec)\r[==] (2/2 sec)\n");
        assert_eq!(out.lines().count(), 1);
    }
}
