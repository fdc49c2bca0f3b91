//! Product search against the catalog's OData endpoint.

use crate::error::{FetchError, Result};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

#[derive(Deserialize, Debug, Clone)]
pub struct ProductDescriptor {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Deserialize, Debug)]
struct SearchPage {
    #[serde(default)]
    value: Vec<ProductDescriptor>,
}

/// Runs a filter query and returns the matching products in catalog order.
/// The catalog is public, no session is needed here.
pub async fn search(
    client: &Client,
    catalog_url: &Url,
    query: &str,
) -> Result<Vec<ProductDescriptor>> {
    let url = format!("{catalog_url}/Products?$filter={query}");
    let response = client.get(&url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url,
        });
    }
    let page: SearchPage = response.json().await?;
    Ok(page.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_search_parses_a_product_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/odata/v1/Products"))
            .and(query_param("$filter", "Collection/Name eq 'SENTINEL-2'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "@odata.context": "$metadata#Products",
                "value": [
                    {
                        "Id": "f3a3f437-4df9-4a6f-b486-37ce28fb6e4e",
                        "Name": "S2B_MSIL2A_20230214T141709_N0509_R096_T19HCC_20230214T190028.SAFE",
                        "Online": true
                    },
                    {
                        "Id": "1b6ff07c-9f54-41a2-8be8-0f9ace42a5fb",
                        "Name": "S2A_MSIL2A_20230219T141701_N0509_R096_T19HCC_20230219T200157.SAFE",
                        "Online": true
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let catalog_url = Url::parse(&format!("{}/odata/v1", server.uri())).unwrap();
        let products = search(&Client::new(), &catalog_url, "Collection/Name eq 'SENTINEL-2'")
            .await
            .unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].id, "f3a3f437-4df9-4a6f-b486-37ce28fb6e4e");
        assert!(products[1].name.starts_with("S2A_MSIL2A"));
    }

    #[tokio::test]
    async fn test_page_without_value_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/odata/v1/Products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let catalog_url = Url::parse(&format!("{}/odata/v1", server.uri())).unwrap();
        let products = search(&Client::new(), &catalog_url, "Name eq 'x'").await.unwrap();
        assert!(products.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_errors_surface_the_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/odata/v1/Products"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let catalog_url = Url::parse(&format!("{}/odata/v1", server.uri())).unwrap();
        let error = search(&Client::new(), &catalog_url, "Name eq 'x'")
            .await
            .unwrap_err();
        assert!(matches!(error, FetchError::HttpStatus { status: 500, .. }));
    }
}
