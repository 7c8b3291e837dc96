use std::fmt::{self, Write};

/// Cells of one table line.
pub(crate) struct Row(Vec<String>);

impl Row {
    /// Header cells must not contain whitespace so the listing splits cleanly
    /// on columns with `awk` or `cut`.
    fn is_awk_safe(&self) -> bool {
        !self
            .0
            .iter()
            .any(|cell| cell.contains(char::is_whitespace))
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Row(cells)
    }
}

impl From<[&str; 2]> for Row {
    fn from(cells: [&str; 2]) -> Self {
        Row(cells.iter().map(|cell| cell.to_string()).collect())
    }
}

/// A left-aligned plain text table. Every column but the last is padded to
/// its widest cell.
pub(crate) struct Table {
    header: Row,
    body: Vec<Row>,
    print_header: bool,
}

impl Table {
    pub(crate) fn with_header(header: impl Into<Row>) -> Table {
        let header = header.into();

        assert!(
            header.is_awk_safe(),
            "table header contains whitespace"
        );

        Table {
            header,
            body: Vec::new(),
            print_header: true,
        }
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    pub(crate) fn add_row(&mut self, row: impl Into<Row>) {
        let row = row.into();

        assert_eq!(
            row.0.len(),
            self.header.0.len(),
            "row width does not match the header"
        );

        self.body.push(row);
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.header.0.len()];

        for row in std::iter::once(&self.header).chain(&self.body) {
            for (width, cell) in widths.iter_mut().zip(&row.0) {
                *width = (*width).max(cell.chars().count());
            }
        }

        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();
        let last = widths.len().saturating_sub(1);

        let header = self.print_header.then_some(&self.header);

        for row in header.into_iter().chain(&self.body) {
            for (i, cell) in row.0.iter().enumerate() {
                if i == last {
                    f.write_str(cell)?;
                } else {
                    write!(f, "{:<width$}  ", cell, width = widths[i])?;
                }
            }

            f.write_char('\n')?;
        }

        Ok(())
    }
}
