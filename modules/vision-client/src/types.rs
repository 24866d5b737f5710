use serde::{Deserialize, Serialize};

// --- Request ---

#[derive(Debug, Clone, Serialize)]
pub struct AnnotateImagesRequest {
    pub requests: Vec<AnnotateImageRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnotateImageRequest {
    pub image: ImageContent,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub max_results: u32,
}

// --- Response ---

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotateImagesResponse {
    #[serde(default)]
    pub responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateImageResponse {
    pub web_detection: Option<WebDetection>,
    pub error: Option<Status>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Status {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Web detection annotations for one image.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebDetection {
    #[serde(default)]
    pub web_entities: Vec<WebEntity>,
    #[serde(default)]
    pub full_matching_images: Vec<WebImage>,
    #[serde(default)]
    pub partial_matching_images: Vec<WebImage>,
    #[serde(default)]
    pub pages_with_matching_images: Vec<WebPage>,
    #[serde(default)]
    pub visually_similar_images: Vec<WebImage>,
    #[serde(default)]
    pub best_guess_labels: Vec<WebLabel>,
}

impl WebDetection {
    pub fn is_empty(&self) -> bool {
        self.full_matching_images.is_empty()
            && self.partial_matching_images.is_empty()
            && self.pages_with_matching_images.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebEntity {
    pub entity_id: Option<String>,
    pub score: Option<f32>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebImage {
    #[serde(default)]
    pub url: String,
    pub score: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPage {
    #[serde(default)]
    pub url: String,
    pub page_title: Option<String>,
    pub score: Option<f32>,
    #[serde(default)]
    pub full_matching_images: Vec<WebImage>,
    #[serde(default)]
    pub partial_matching_images: Vec<WebImage>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebLabel {
    pub label: String,
    pub language_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_web_detection() {
        let json = r#"{
            "responses": [{
                "webDetection": {
                    "fullMatchingImages": [{"url": "https://cdn.example/cover.jpg"}],
                    "partialMatchingImages": [{"url": "https://cdn.example/crop.jpg", "score": 0.12}],
                    "pagesWithMatchingImages": [{
                        "url": "https://blog.example/post",
                        "pageTitle": "<b>Cover</b> scan",
                        "fullMatchingImages": [{"url": "https://blog.example/cover.jpg"}]
                    }],
                    "bestGuessLabels": [{"label": "manga", "languageCode": "en"}]
                }
            }]
        }"#;
        let resp: AnnotateImagesResponse = serde_json::from_str(json).unwrap();
        let wd = resp.responses[0].web_detection.as_ref().unwrap();
        assert_eq!(wd.full_matching_images.len(), 1);
        assert_eq!(wd.full_matching_images[0].score, None);
        assert_eq!(wd.partial_matching_images[0].score, Some(0.12));
        assert_eq!(wd.pages_with_matching_images[0].full_matching_images.len(), 1);
        assert!(wd.visually_similar_images.is_empty());
        assert!(!wd.is_empty());
    }

    #[test]
    fn empty_annotation_is_empty() {
        let resp: AnnotateImagesResponse =
            serde_json::from_str(r#"{"responses": [{"webDetection": {}}]}"#).unwrap();
        assert!(resp.responses[0].web_detection.as_ref().unwrap().is_empty());
    }

    #[test]
    fn feature_serializes_type_field() {
        let f = Feature {
            feature_type: "WEB_DETECTION".into(),
            max_results: 50,
        };
        let v = serde_json::to_value(&f).unwrap();
        assert_eq!(v["type"], "WEB_DETECTION");
        assert_eq!(v["maxResults"], 50);
    }
}
