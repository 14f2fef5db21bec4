use std::io::Write;

use identify::content::Content;
use identify::mimetype::identify_mimetype;
use identify::mimetype_map::mimetype_map;

const RFC822: &[u8] = b"From: Alice <alice@example.com>\r
To: Bob <bob@example.com>\r
Subject: Espresso\r
Date: Tue, 10 Oct 2023 09:30:00 -0700\r
Message-ID: <1234@example.com>\r
\r
Backflush weekly.\r
";

#[tokio::test]
#[ignore = "requires a running Tika server"]
async fn test_identify_rfc822() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".eml").tempfile()?;
    file.write_all(RFC822)?;

    let mimetype = identify_mimetype(file.path()).await?;

    assert_eq!(mimetype, Some("message/rfc822".to_string()));
    Ok(())
}

#[tokio::test]
#[ignore = "requires a running Tika server"]
async fn test_mimetype_if_not_matches() -> anyhow::Result<()> {
    let mut file = tempfile::Builder::new().suffix(".eml").tempfile()?;
    file.write_all(RFC822)?;

    let claimed_pdf = Content::from_path(file.path(), "application/pdf").await;
    let claimed_rfc822 = claimed_pdf.with_mimetype("message/rfc822");

    assert_eq!(
        mimetype_map().mimetype_if_not_matches(&claimed_pdf).await,
        Some("message/rfc822".to_string())
    );
    assert_eq!(mimetype_map().mimetype_if_not_matches(&claimed_rfc822).await, None);
    Ok(())
}
