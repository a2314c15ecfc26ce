//! Server-rendered listing page. One document: notice banner, add-book form,
//! authors with their books and per-row delete links.

use crate::model::AuthorWithBooks;

pub fn render_catalogue(listing: &[AuthorWithBooks], notice: Option<&str>) -> String {
    let mut body = String::new();

    if let Some(notice) = notice {
        body.push_str(&format!(
            "        <p class=\"notice\">{}</p>\n",
            escape(notice)
        ));
    }

    body.push_str(
        r#"        <form action="/" method="post">
            <label>Author <input type="text" name="author_name"></label>
            <label>Book <input type="text" name="book_name"></label>
            <input type="submit" value="Add book">
        </form>
"#,
    );

    body.push_str("        <ul class=\"authors\">\n");
    for entry in listing {
        body.push_str(&format!(
            "            <li>{} <a href=\"/delete_author/{}\">delete</a>\n                <ul class=\"books\">\n",
            escape(&entry.author.name),
            entry.author.id
        ));
        for book in &entry.books {
            body.push_str(&format!(
                "                    <li>{} <a href=\"/delete_book/{}\">delete</a></li>\n",
                escape(&book.name),
                book.id
            ));
        }
        body.push_str("                </ul>\n            </li>\n");
    }
    body.push_str("        </ul>\n");

    format!(
        r#"<!doctype html>
<html>
    <head>
        <meta charset="utf-8">
        <title>shelfd</title>
    </head>
    <body>
{body}    </body>
</html>
"#
    )
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Book};

    #[test]
    fn escapes_markup_in_names() {
        assert_eq!(escape("<b>&\"'"), "&lt;b&gt;&amp;&quot;&#39;");
    }

    #[test]
    fn renders_notice_and_nested_books() {
        let listing = vec![AuthorWithBooks {
            author: Author {
                id: 1,
                name: "老王".to_string(),
            },
            books: vec![Book {
                id: 7,
                name: "老王回忆录".to_string(),
                author_id: 1,
            }],
        }];

        let page = render_catalogue(&listing, Some("storage unavailable"));
        assert!(page.contains("storage unavailable"));
        assert!(page.contains("老王"));
        assert!(page.contains("/delete_author/1"));
        assert!(page.contains("/delete_book/7"));
    }

    #[test]
    fn renders_empty_catalogue_without_notice() {
        let page = render_catalogue(&[], None);
        assert!(!page.contains("class=\"notice\""));
        assert!(page.contains("name=\"author_name\""));
    }
}
