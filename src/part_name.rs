use std::fmt;

/// Absolute name of a part inside a package, e.g. `/ppt/slides/slide1.xml`.
///
/// Part names always start with a forward slash. The zip member name is the
/// same string without the leading slash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartName(String);

impl PartName {
    /// Builds a part name, adding the leading slash when it is missing.
    pub fn new(name: &str) -> Self {
        if name.starts_with('/') {
            PartName(name.to_string())
        } else {
            PartName(format!("/{}", name))
        }
    }

    /// Resolves a relationship target relative to the directory of `base`.
    ///
    /// Absolute targets (leading slash) ignore the base. `..` and `.` segments
    /// are collapsed.
    ///
    /// # Example
    ///
    /// ```
    /// use pptx_combine::PartName;
    ///
    /// let slide = PartName::new("/ppt/slides/slide1.xml");
    /// let image = PartName::resolve(&slide, "../media/image1.png");
    /// assert_eq!(image.as_str(), "/ppt/media/image1.png");
    /// ```
    pub fn resolve(base: &PartName, target: &str) -> Self {
        let target = target.split('#').next().unwrap_or("");
        let joined = if target.starts_with('/') {
            target.to_string()
        } else {
            format!("{}/{}", base.directory(), target)
        };

        let mut segments: Vec<&str> = Vec::new();
        for segment in joined.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    segments.pop();
                }
                other => segments.push(other),
            }
        }
        PartName(format!("/{}", segments.join("/")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Part names compare case-insensitively (ASCII) inside a package.
    pub fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }

    /// Zip member name, i.e. the part name without its leading slash.
    pub fn member(&self) -> &str {
        &self.0[1..]
    }

    /// Directory portion, `/ppt/slides` for `/ppt/slides/slide1.xml`. The root is an empty string.
    pub fn directory(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[..pos],
            None => "",
        }
    }

    pub fn file_name(&self) -> &str {
        match self.0.rfind('/') {
            Some(pos) => &self.0[pos + 1..],
            None => &self.0,
        }
    }

    /// Lower-cased extension without the dot, empty if there is none.
    pub fn extension(&self) -> String {
        let file_name = self.file_name();
        match file_name.rfind('.') {
            Some(pos) if pos > 0 => file_name[pos + 1..].to_ascii_lowercase(),
            _ => String::new(),
        }
    }

    /// Name of the relationships part belonging to this part.
    ///
    /// `/ppt/slides/slide1.xml` has its relationships in `/ppt/slides/_rels/slide1.xml.rels`.
    pub fn rels_name(&self) -> PartName {
        PartName(format!("{}/_rels/{}.rels", self.directory(), self.file_name()))
    }

    /// Relative reference from the directory of `from` to this part, as written into a `.rels` file.
    pub fn relative_to(&self, from: &PartName) -> String {
        let from_segments: Vec<&str> = from.directory().split('/').filter(|s| !s.is_empty()).collect();
        let to_segments: Vec<&str> = self.0.split('/').filter(|s| !s.is_empty()).collect();

        let common = from_segments
            .iter()
            .zip(to_segments.iter())
            .take_while(|(a, b)| a == b)
            .count();

        let mut parts: Vec<&str> = Vec::new();
        for _ in common..from_segments.len() {
            parts.push("..");
        }
        parts.extend(to_segments[common..].iter().copied());
        parts.join("/")
    }

    /// Splits the file name into its stem without trailing digits, the numeric
    /// index and the extension: `slide12.xml` gives `("slide", Some(12), "xml")`.
    pub fn split_index(&self) -> (&str, Option<u32>, &str) {
        let file_name = self.file_name();
        let (stem, ext) = match file_name.rfind('.') {
            Some(pos) if pos > 0 => (&file_name[..pos], &file_name[pos + 1..]),
            _ => (file_name, ""),
        };
        let digits_start = stem
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)
            .unwrap_or(stem.len());
        let index = stem[digits_start..].parse::<u32>().ok();
        (&stem[..digits_start], index, ext)
    }

    /// Same directory and extension, different stem and index: `dir/{stem}{index}.{ext}`.
    pub fn with_index(&self, stem: &str, index: u32, ext: &str) -> PartName {
        if ext.is_empty() {
            PartName(format!("{}/{}{}", self.directory(), stem, index))
        } else {
            PartName(format!("{}/{}{}.{}", self.directory(), stem, index, ext))
        }
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
