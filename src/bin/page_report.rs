use a5_booklet_pdf::geometry::PageBox;
use a5_booklet_pdf::source::{inherited, page_geometry};
use lopdf::Document;
use std::env;

fn main() {
    let Some(path) = env::args().nth(1) else {
        eprintln!("usage: page-report <file.pdf>");
        std::process::exit(2);
    };

    let doc = match Document::load(&path) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("Error loading {}: {}", path, e);
            std::process::exit(1);
        }
    };

    let pages = doc.get_pages();
    println!("{}: {} pages", path, pages.len());

    for (page_num, &page_id) in pages.iter() {
        let Ok(page) = doc.get_dictionary(page_id) else {
            println!("  page {}: <missing>", page_num);
            continue;
        };
        let geometry = page_geometry(&doc, page);
        let (w, h) = geometry.displayed_size();
        let media = inherited(&doc, page, b"MediaBox").and_then(PageBox::from_object);
        println!(
            "  page {}: {:.2} x {:.2} pt (rotate {}), media box {:?}, content: {}",
            page_num,
            w,
            h,
            geometry.rotate,
            media.map(|b| (b.llx, b.lly, b.urx, b.ury)),
            if page.has(b"Contents") { "yes" } else { "blank" }
        );
    }
}
