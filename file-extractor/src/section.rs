//! Typed section stream produced by extractors and consumed by the chunker.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Page,
    Slide,
    Sheet,
    Heading,
    Paragraph,
    Table,
}

/// One ordered element of an extracted document. Which optional fields are
/// populated depends on the kind: pages carry `page`, slides carry `slide`
/// and possibly `title`, sheets carry `sheet` and `row_range`, headings carry
/// `level` and `title`.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub kind: SectionKind,
    pub text: String,
    pub level: Option<u8>,
    pub title: Option<String>,
    pub page: Option<u32>,
    pub slide: Option<u32>,
    pub sheet: Option<String>,
    pub row_range: Option<(u32, u32)>,
}

impl Section {
    pub fn new(kind: SectionKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            level: None,
            title: None,
            page: None,
            slide: None,
            sheet: None,
            row_range: None,
        }
    }

    pub fn heading(level: u8, title: impl Into<String>) -> Self {
        let title = title.into();
        let mut s = Self::new(SectionKind::Heading, title.clone());
        s.level = Some(level);
        s.title = Some(title);
        s
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Self::new(SectionKind::Paragraph, text)
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_slide(mut self, slide: u32) -> Self {
        self.slide = Some(slide);
        self
    }
}
