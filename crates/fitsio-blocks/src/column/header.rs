/// Maps a standard column keyword root such as `TFORM` to the concrete
/// keyword for one particular column.
///
/// Each instance is bound to a single column.
pub trait BintableColumnHeader {
    fn key_name(&self, root: &str) -> String;
}

/// The standard convention: root followed by the 1-based column number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardColumnHeader {
    jcol: usize,
}

impl StandardColumnHeader {
    /// Resolver for 1-based column `jcol`.
    pub fn new(jcol: usize) -> Self {
        StandardColumnHeader { jcol }
    }

    pub fn column(&self) -> usize {
        self.jcol
    }
}

impl BintableColumnHeader for StandardColumnHeader {
    fn key_name(&self, root: &str) -> String {
        format!("{root}{}", self.jcol)
    }
}

impl<F: Fn(&str) -> String> BintableColumnHeader for F {
    fn key_name(&self, root: &str) -> String {
        self(root)
    }
}
