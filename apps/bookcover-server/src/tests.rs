//! HTTP tests for the book cover server
//!
//! The Shopify Admin API is replaced by a recording fake so the full
//! upload → composite → register flow runs in-process.

#[cfg(test)]
mod api_tests {
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use bookcover_core::{ComposeOptions, PageSize};
    use lopdf::{Dictionary, Document, Object, Stream};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use shopify_admin::{AdminApi, AdminError, StagedUploadTarget};

    use crate::build_router;
    use crate::error::{PRICE_UPDATE_FAILED, PROCESSING_FAILED};
    use crate::registration::StatusRetention;
    use crate::state::{AppState, ServerConfig};

    /// Records Admin API traffic and answers with canned payloads
    #[derive(Default)]
    struct FakeAdmin {
        calls: Mutex<Vec<String>>,
        stage_user_error: bool,
        fail_variant_update: bool,
    }

    impl FakeAdmin {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AdminApi for FakeAdmin {
        async fn graphql(&self, query: &str, variables: Value) -> Result<Value, AdminError> {
            if query.contains("stagedUploadsCreate(") {
                let filename = variables["input"][0]["filename"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                self.calls.lock().unwrap().push(format!("stage {}", filename));
                if self.stage_user_error {
                    return Ok(json!({
                        "stagedUploadsCreate": {
                            "stagedTargets": [],
                            "userErrors": [{"field": ["input"], "message": "Filename is invalid"}]
                        }
                    }));
                }
                Ok(json!({
                    "stagedUploadsCreate": {
                        "stagedTargets": [{
                            "url": "https://uploads.example.com/bucket",
                            "resourceUrl": format!("https://uploads.example.com/tmp/{}", filename),
                            "parameters": [{"name": "key", "value": "tmp/key"}]
                        }],
                        "userErrors": []
                    }
                }))
            } else if query.contains("fileCreate(") {
                let source = variables["files"][0]["originalSource"]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                self.calls.lock().unwrap().push(format!("create {}", source));
                Ok(json!({
                    "fileCreate": {
                        "files": [{"id": "gid://shopify/GenericFile/7"}],
                        "userErrors": []
                    }
                }))
            } else {
                self.calls.lock().unwrap().push("fetch".to_string());
                Ok(json!({
                    "node": {
                        "id": "gid://shopify/GenericFile/7",
                        "fileStatus": "READY",
                        "originalSource": "https://cdn.example.com/book.pdf"
                    }
                }))
            }
        }

        async fn upload_staged(
            &self,
            target: &StagedUploadTarget,
            file_name: &str,
            contents: Vec<u8>,
        ) -> Result<(), AdminError> {
            assert!(contents.starts_with(b"%PDF"));
            self.calls
                .lock()
                .unwrap()
                .push(format!("upload {} {}", target.url, file_name));
            Ok(())
        }

        async fn update_variant_price(
            &self,
            variant_id: u64,
            rate: &str,
        ) -> Result<Value, AdminError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("variant {} {}", variant_id, rate));
            if self.fail_variant_update {
                return Err(AdminError::Status {
                    status: 422,
                    body: "price is invalid".into(),
                });
            }
            Ok(json!({ "variant": { "id": variant_id, "price": rate } }))
        }
    }

    struct Harness {
        server: TestServer,
        admin: Arc<FakeAdmin>,
        upload_dir: tempfile::TempDir,
    }

    fn harness_with(admin: FakeAdmin, variant_id: Option<u64>, delete_after_register: bool) -> Harness {
        harness_with_retention(
            admin,
            variant_id,
            delete_after_register,
            StatusRetention::default(),
        )
    }

    fn harness_with_retention(
        admin: FakeAdmin,
        variant_id: Option<u64>,
        delete_after_register: bool,
        status_retention: StatusRetention,
    ) -> Harness {
        let upload_dir = tempfile::tempdir().unwrap();
        let admin = Arc::new(admin);

        let config = ServerConfig {
            upload_dir: upload_dir.path().to_path_buf(),
            static_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static"),
            compose: ComposeOptions {
                page_size: PageSize::A4,
            },
            variant_id,
            delete_after_register,
            max_upload_bytes: 10 * 1024 * 1024,
            status_retention,
        };

        let state = AppState::new(config, admin.clone());
        let server = TestServer::new(build_router(state)).unwrap();

        Harness {
            server,
            admin,
            upload_dir,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeAdmin::default(), Some(45722719486210), false)
    }

    /// Helper to create a simple PDF with N pages
    fn create_test_pdf(num_pages: u32) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut kids = Vec::new();
        for page_num in 0..num_pages {
            let content = format!("BT /F1 12 Tf 50 700 Td (Page {}) Tj ET", page_num + 1);
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));

            let mut page = Dictionary::new();
            page.set("Type", Object::Name(b"Page".to_vec()));
            page.set("Parent", Object::Reference(pages_id));
            page.set("Contents", Object::Reference(content_id));
            page.set(
                "MediaBox",
                Object::Array(vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(612),
                    Object::Integer(792),
                ]),
            );
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(num_pages as i64));
        pages.set("Kids", Object::Array(kids));
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(pages_id));
        let catalog_id = doc.add_object(catalog);
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    /// Solid RGB PNG as a data URL, the way the upload form sends it
    fn png_data_url(width: u32, height: u32, rgb: [u8; 3]) -> String {
        let data: Vec<u8> = (0..width * height).flat_map(|_| rgb).collect();
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&data).unwrap();
        }
        format!("data:image/png;base64,{}", BASE64.encode(out))
    }

    fn upload_form(pdf: Vec<u8>, file_name: &str) -> MultipartForm {
        MultipartForm::new()
            .add_part(
                "pdf",
                Part::bytes(pdf)
                    .file_name(file_name)
                    .mime_type("application/pdf"),
            )
            .add_text("book_coverFront", png_data_url(100, 100, [255, 0, 0]))
            .add_text("book_coverBack", png_data_url(100, 100, [0, 0, 255]))
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Poll the status endpoint until the registration leaves queued/running
    async fn wait_for_registration(server: &TestServer, id: &str) -> Value {
        for _ in 0..200 {
            let status = server
                .get(&format!("/api/registrations/{}", id))
                .await
                .json::<Value>();
            if status["state"] != "queued" && status["state"] != "running" {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("registration {} did not finish", id);
    }

    #[tokio::test]
    async fn test_health_returns_200() {
        let h = harness();
        let response = h.server.get("/health").await;
        response.assert_status_ok();

        let json = response.json::<Value>();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "bookcover-server");
    }

    #[tokio::test]
    async fn test_index_serves_upload_form() {
        let h = harness();
        let response = h.server.get("/").await;
        response.assert_status_ok();
        assert!(response.text().contains("book_coverFront"));
    }

    #[tokio::test]
    async fn test_upload_three_pages_yields_five_page_result() {
        let h = harness();

        let response = h
            .server
            .post("/upload")
            .multipart(upload_form(create_test_pdf(3), "book.pdf"))
            .await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        let filename = body["Filename"].as_str().unwrap().to_string();
        assert!(body["message"].as_str().unwrap().contains("successfully"));
        assert!(filename.ends_with("-book-result.pdf"), "got {}", filename);

        let output = h.upload_dir.path().join(&filename);
        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 5);

        // Original upload is kept next to the result, byte for byte
        let source_name = filename.replace("-result.pdf", ".pdf");
        assert_eq!(
            std::fs::read(h.upload_dir.path().join(&source_name)).unwrap(),
            create_test_pdf(3)
        );

        // Composited file is served under /uploads
        let served = h.server.get(&format!("/uploads/{}", filename)).await;
        served.assert_status_ok();
        assert_eq!(served.as_bytes().to_vec(), bytes);

        let id = body["registrationId"].as_str().unwrap();
        let status = wait_for_registration(&h.server, id).await;
        assert_eq!(status["state"], "completed");
        assert_eq!(status["filename"], filename.as_str());
        assert_eq!(status["file"]["id"], "gid://shopify/GenericFile/7");
        assert_eq!(status["file"]["fileStatus"], "READY");

        assert_eq!(
            h.admin.calls(),
            vec![
                format!("stage {}", filename),
                format!("upload https://uploads.example.com/bucket {}", filename),
                format!("create https://uploads.example.com/tmp/{}", filename),
                "fetch".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_uploads_of_same_name_do_not_collide() {
        let h = harness();

        let first = h
            .server
            .post("/upload")
            .multipart(upload_form(create_test_pdf(1), "same.pdf"))
            .await
            .json::<Value>();
        let second = h
            .server
            .post("/upload")
            .multipart(upload_form(create_test_pdf(2), "same.pdf"))
            .await
            .json::<Value>();

        assert_ne!(first["Filename"], second["Filename"]);
        assert_eq!(files_in(h.upload_dir.path()).len(), 4);
    }

    #[tokio::test]
    async fn test_corrupt_pdf_returns_500_without_output() {
        let h = harness();

        let response = h
            .server
            .post("/upload")
            .multipart(upload_form(b"this is not a pdf".to_vec(), "broken.pdf"))
            .await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<Value>(), json!({ "message": PROCESSING_FAILED }));

        let files = files_in(h.upload_dir.path());
        assert_eq!(files.len(), 1);
        assert!(files.iter().all(|name| !name.ends_with("-result.pdf")));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(h.admin.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_cover_returns_500() {
        let h = harness();
        let form = MultipartForm::new()
            .add_part("pdf", Part::bytes(create_test_pdf(1)).file_name("book.pdf"))
            .add_text("book_coverFront", "data:image/png;base64,AAAA")
            .add_text("book_coverBack", png_data_url(2, 2, [0, 0, 0]));

        let response = h.server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert!(h.admin.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_pdf_field_returns_500() {
        let h = harness();
        let form = MultipartForm::new()
            .add_text("book_coverFront", png_data_url(2, 2, [0, 0, 0]))
            .add_text("book_coverBack", png_data_url(2, 2, [0, 0, 0]));

        let response = h.server.post("/upload").multipart(form).await;

        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.json::<Value>()["message"], PROCESSING_FAILED);
        assert!(files_in(h.upload_dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_stage_user_error_still_returns_200() {
        let h = harness_with(
            FakeAdmin {
                stage_user_error: true,
                ..Default::default()
            },
            None,
            false,
        );

        let response = h
            .server
            .post("/upload")
            .multipart(upload_form(create_test_pdf(2), "book.pdf"))
            .await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        let status = wait_for_registration(&h.server, body["registrationId"].as_str().unwrap()).await;

        assert_eq!(status["state"], "failed");
        assert_eq!(status["step"], "stage_request");
        assert!(status["message"]
            .as_str()
            .unwrap()
            .contains("Filename is invalid"));
        assert_eq!(h.admin.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_after_register_removes_artifacts() {
        let h = harness_with(FakeAdmin::default(), None, true);

        let body = h
            .server
            .post("/upload")
            .multipart(upload_form(create_test_pdf(1), "book.pdf"))
            .await
            .json::<Value>();

        let status = wait_for_registration(&h.server, body["registrationId"].as_str().unwrap()).await;
        assert_eq!(status["state"], "completed");

        for _ in 0..100 {
            if files_in(h.upload_dir.path()).is_empty() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("artifacts were not removed: {:?}", files_in(h.upload_dir.path()));
    }

    #[tokio::test]
    async fn test_unknown_registration_returns_404() {
        let h = harness();

        h.server
            .get("/api/registrations/6f1c2a4e-3b0d-4c55-9a57-1f1a2b3c4d5e")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        h.server
            .get("/api/registrations/not-a-uuid")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rate_json_updates_variant() {
        let h = harness();

        let response = h.server.post("/rate").json(&json!({ "rate": "24.50" })).await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({ "data": { "variant": { "id": 45722719486210u64, "price": "24.50" } } })
        );
        assert_eq!(h.admin.calls(), vec!["variant 45722719486210 24.50".to_string()]);
    }

    #[tokio::test]
    async fn test_rate_numeric_json_is_accepted() {
        let h = harness();

        h.server
            .post("/rate")
            .json(&json!({ "rate": 12 }))
            .await
            .assert_status_ok();
        assert_eq!(h.admin.calls(), vec!["variant 45722719486210 12".to_string()]);
    }

    #[tokio::test]
    async fn test_rate_form_updates_variant() {
        let h = harness();

        let response = h.server.post("/rate").form(&json!({ "rate": "9.99" })).await;

        response.assert_status_ok();
        assert_eq!(h.admin.calls(), vec!["variant 45722719486210 9.99".to_string()]);
    }

    #[tokio::test]
    async fn test_rate_upstream_failure_still_responds() {
        let h = harness_with(
            FakeAdmin {
                fail_variant_update: true,
                ..Default::default()
            },
            Some(1),
            false,
        );

        let response = h.server.post("/rate").json(&json!({ "rate": "5" })).await;

        response.assert_status(StatusCode::BAD_GATEWAY);
        assert_eq!(response.json::<Value>(), json!({ "message": PRICE_UPDATE_FAILED }));
    }

    #[tokio::test]
    async fn test_rate_rejects_invalid_values() {
        let h = harness();

        h.server
            .post("/rate")
            .json(&json!({ "rate": "free" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        h.server
            .post("/rate")
            .json(&json!({ "price": "1" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
        assert!(h.admin.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rate_without_variant_returns_503() {
        let h = harness_with(FakeAdmin::default(), None, false);

        let response = h.server.post("/rate").json(&json!({ "rate": "5" })).await;

        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        assert!(h.admin.calls().is_empty());
    }

    #[tokio::test]
    async fn test_finished_registrations_are_evicted_past_cap() {
        let h = harness_with_retention(
            FakeAdmin::default(),
            None,
            false,
            StatusRetention {
                ttl: Duration::from_secs(3600),
                max_finished: 2,
            },
        );

        let mut ids = Vec::new();
        for _ in 0..4 {
            let body = h
                .server
                .post("/upload")
                .multipart(upload_form(create_test_pdf(1), "book.pdf"))
                .await
                .json::<Value>();
            let id = body["registrationId"].as_str().unwrap().to_string();
            let status = wait_for_registration(&h.server, &id).await;
            assert_eq!(status["state"], "completed");
            ids.push(id);
        }

        for id in &ids[..2] {
            h.server
                .get(&format!("/api/registrations/{}", id))
                .await
                .assert_status(StatusCode::NOT_FOUND);
        }
        for id in &ids[2..] {
            h.server
                .get(&format!("/api/registrations/{}", id))
                .await
                .assert_status_ok();
        }
    }

    #[test]
    fn test_default_static_dir_does_not_depend_on_working_directory() {
        use clap::Parser;

        let args = crate::Args::try_parse_from([
            "bookcover-server",
            "--store-url",
            "https://example.myshopify.com",
            "--access-token",
            "token",
            "--static-dir",
            crate::DEFAULT_STATIC_DIR,
        ])
        .unwrap();
        assert!(args.static_dir.is_absolute());
        assert!(args.static_dir.join("index.html").is_file());

        let default_dir = PathBuf::from(crate::DEFAULT_STATIC_DIR);
        assert!(default_dir.is_absolute());
        assert!(default_dir.join("index.html").is_file());
    }
}
