use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Встроенная в лист картинка с якорной ячейкой
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    /// Строка привязки (0-based), из `xdr:from/xdr:row`
    pub anchor_row: usize,
    /// Колонка привязки (0-based), из `xdr:from/xdr:col`
    pub anchor_col: usize,
    pub data: Vec<u8>,
    /// Расширение файла из xl/media (без точки)
    pub extension: String,
}

/// Извлечь все встроенные картинки из xlsx-контейнера
///
/// Порядок результата — порядок обнаружения: части drawingN.xml по
/// возрастанию N, внутри части — порядок якорей в документе. Якоря без
/// картинки и неразрешимые ссылки пропускаются, битый контейнер — ошибка.
pub fn extract_images(xlsx_bytes: &[u8]) -> Result<Vec<EmbeddedImage>> {
    let mut archive = ZipArchive::new(Cursor::new(xlsx_bytes.to_vec()))
        .context("Failed to open xlsx container")?;

    let mut drawing_parts: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with("xl/drawings/drawing") && n.ends_with(".xml"))
        .map(String::from)
        .collect();
    drawing_parts.sort_by_key(|n| part_number(n));

    let mut images = Vec::new();

    for part in drawing_parts {
        let drawing_xml = read_archive_text(&mut archive, &part)?;

        let rels_part = rels_path(&part);
        let relationships = match read_archive_text(&mut archive, &rels_part) {
            Ok(xml) => parse_relationships(&xml)?,
            // Drawing без связей не содержит картинок
            Err(_) => continue,
        };

        for anchor in parse_anchors(&drawing_xml)? {
            let Some(target) = relationships.get(&anchor.embed_id) else {
                tracing::warn!("Unresolved image relationship: {}", anchor.embed_id);
                continue;
            };
            let media_path = resolve_media_path(target);
            let mut file = match archive.by_name(&media_path) {
                Ok(f) => f,
                Err(_) => {
                    tracing::warn!("Missing media part: {}", media_path);
                    continue;
                }
            };
            let mut data = Vec::new();
            file.read_to_end(&mut data)
                .with_context(|| format!("Failed to read media part: {}", media_path))?;

            images.push(EmbeddedImage {
                anchor_row: anchor.row,
                anchor_col: anchor.col,
                data,
                extension: media_extension(&media_path),
            });
        }
    }

    Ok(images)
}

struct ImageAnchor {
    row: usize,
    col: usize,
    embed_id: String,
}

/// Разобрать drawingN.xml: якорные ячейки и ссылки r:embed
fn parse_anchors(xml: &str) -> Result<Vec<ImageAnchor>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut anchors = Vec::new();
    let mut in_anchor = false;
    let mut in_from = false;
    let mut in_from_row = false;
    let mut in_from_col = false;
    let mut current_row: Option<usize> = None;
    let mut current_col: Option<usize> = None;
    let mut current_embed: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let local = e.local_name();
                let local = local.as_ref();
                match local {
                    b"twoCellAnchor" | b"oneCellAnchor" => {
                        in_anchor = true;
                        current_row = None;
                        current_col = None;
                        current_embed = None;
                    }
                    b"from" if in_anchor => in_from = true,
                    b"row" if in_from => in_from_row = true,
                    b"col" if in_from => in_from_col = true,
                    b"blip" if in_anchor => {
                        for attr in e.attributes().flatten() {
                            if attr.key.local_name().as_ref() == b"embed" {
                                current_embed =
                                    Some(String::from_utf8_lossy(&attr.value).into_owned());
                            }
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(t)) => {
                let text = String::from_utf8_lossy(t.as_ref()).trim().to_string();
                if in_from_row && current_row.is_none() {
                    current_row = text.parse::<usize>().ok();
                }
                if in_from_col && current_col.is_none() {
                    current_col = text.parse::<usize>().ok();
                }
            }
            Ok(Event::End(e)) => {
                let local = e.local_name();
                match local.as_ref() {
                    b"twoCellAnchor" | b"oneCellAnchor" => {
                        if let (Some(row), Some(embed_id)) =
                            (current_row.take(), current_embed.take())
                        {
                            anchors.push(ImageAnchor {
                                row,
                                col: current_col.take().unwrap_or(0),
                                embed_id,
                            });
                        }
                        in_anchor = false;
                    }
                    b"from" => in_from = false,
                    b"row" => in_from_row = false,
                    b"col" => in_from_col = false,
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("Malformed drawing xml: {}", e)),
            _ => {}
        }
    }

    Ok(anchors)
}

/// Разобрать .rels: Id -> Target
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut map = HashMap::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"Relationship" {
                    let mut id = None;
                    let mut target = None;
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"Id" => id = Some(String::from_utf8_lossy(&attr.value).into_owned()),
                            b"Target" => {
                                target = Some(String::from_utf8_lossy(&attr.value).into_owned())
                            }
                            _ => {}
                        }
                    }
                    if let (Some(id), Some(target)) = (id, target) {
                        map.insert(id, target);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("Malformed rels xml: {}", e)),
            _ => {}
        }
    }
    Ok(map)
}

fn read_archive_text(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Result<String> {
    let mut file = archive
        .by_name(name)
        .with_context(|| format!("Missing part: {}", name))?;
    let mut text = String::new();
    file.read_to_string(&mut text)
        .with_context(|| format!("Failed to read part: {}", name))?;
    Ok(text)
}

fn part_number(name: &str) -> u32 {
    name.chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn rels_path(drawing_part: &str) -> String {
    let file_name = drawing_part.rsplit('/').next().unwrap_or(drawing_part);
    format!("xl/drawings/_rels/{}.rels", file_name)
}

/// Target вида "../media/image1.png" относительно xl/drawings/
fn resolve_media_path(target: &str) -> String {
    if let Some(stripped) = target.strip_prefix("../") {
        format!("xl/{}", stripped)
    } else if target.starts_with("/xl/") {
        target.trim_start_matches('/').to_string()
    } else {
        format!("xl/drawings/{}", target)
    }
}

fn media_extension(path: &str) -> String {
    path.rsplit('.')
        .next()
        .unwrap_or("png")
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const DRAWING_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<xdr:wsDr xmlns:xdr="http://schemas.openxmlformats.org/drawingml/2006/spreadsheetDrawing"
          xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"
          xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
  <xdr:twoCellAnchor editAs="oneCell">
    <xdr:from><xdr:col>0</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>1</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:to><xdr:col>1</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>2</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:to>
    <xdr:pic>
      <xdr:blipFill><a:blip r:embed="rId1"/></xdr:blipFill>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:twoCellAnchor>
  <xdr:oneCellAnchor>
    <xdr:from><xdr:col>2</xdr:col><xdr:colOff>0</xdr:colOff><xdr:row>3</xdr:row><xdr:rowOff>0</xdr:rowOff></xdr:from>
    <xdr:ext cx="100" cy="100"/>
    <xdr:pic>
      <xdr:blipFill><a:blip r:embed="rId2"/></xdr:blipFill>
    </xdr:pic>
    <xdr:clientData/>
  </xdr:oneCellAnchor>
</xdr:wsDr>"#;

    const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image1.png"/>
  <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image2.jpeg"/>
</Relationships>"#;

    fn build_container() -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        zip.start_file("xl/drawings/drawing1.xml", options).unwrap();
        zip.write_all(DRAWING_XML.as_bytes()).unwrap();

        zip.start_file("xl/drawings/_rels/drawing1.xml.rels", options)
            .unwrap();
        zip.write_all(RELS_XML.as_bytes()).unwrap();

        zip.start_file("xl/media/image1.png", options).unwrap();
        zip.write_all(b"png-bytes-1").unwrap();

        zip.start_file("xl/media/image2.jpeg", options).unwrap();
        zip.write_all(b"jpeg-bytes-2").unwrap();

        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_extracts_images_with_anchor_rows() {
        let container = build_container();
        let images = extract_images(&container).unwrap();

        assert_eq!(images.len(), 2);
        assert_eq!(images[0].anchor_row, 1);
        assert_eq!(images[0].anchor_col, 0);
        assert_eq!(images[0].data, b"png-bytes-1");
        assert_eq!(images[0].extension, "png");
        assert_eq!(images[1].anchor_row, 3);
        assert_eq!(images[1].anchor_col, 2);
        assert_eq!(images[1].extension, "jpeg");
    }

    #[test]
    fn test_container_without_drawings_yields_nothing() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("xl/workbook.xml", SimpleFileOptions::default())
            .unwrap();
        zip.write_all(b"<workbook/>").unwrap();
        let container = zip.finish().unwrap().into_inner();

        let images = extract_images(&container).unwrap();
        assert!(images.is_empty());
    }

    #[test]
    fn test_broken_container_is_an_error() {
        assert!(extract_images(b"definitely not a zip").is_err());
    }

    #[test]
    fn test_media_path_resolution() {
        assert_eq!(resolve_media_path("../media/image1.png"), "xl/media/image1.png");
        assert_eq!(resolve_media_path("/xl/media/x.png"), "xl/media/x.png");
    }
}
