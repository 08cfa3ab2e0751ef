//! Gateway model

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::istio_resource;
use crate::mesh::NETWORKING_API_VERSION;

/// Istio Gateway
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gateway {
    /// API version
    #[serde(default = "Gateway::default_api_version")]
    pub api_version: String,
    /// Kind
    #[serde(default = "Gateway::default_kind")]
    pub kind: String,
    /// Metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Listener spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<GatewaySpec>,
}

istio_resource!(Gateway, NETWORKING_API_VERSION, "Gateway");

/// Gateway spec
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Labels selecting the gateway proxy pods
    #[serde(default)]
    pub selector: BTreeMap<String, String>,
    /// Listeners
    #[serde(default)]
    pub servers: Vec<GatewayServer>,
}

/// One gateway listener
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayServer {
    /// Listener port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<GatewayPort>,
    /// Hosts exposed on the listener
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Listener name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Remaining fields (tls, bind, ...)
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Gateway listener port
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPort {
    /// Port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    /// Protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gateway() {
        let gw: Gateway = serde_yaml::from_str(
            r#"
apiVersion: networking.istio.io/v1beta1
kind: Gateway
metadata: {name: public, namespace: demo}
spec:
  selector: {istio: ingressgateway}
  servers:
  - port: {number: 443, name: https, protocol: HTTPS}
    hosts: ["shop.example.com"]
    tls: {mode: SIMPLE, credentialName: shop-cert}
"#,
        )
        .expect("parse");
        let spec = gw.spec.as_ref().expect("spec");
        assert_eq!(spec.selector["istio"], "ingressgateway");
        let server = &spec.servers[0];
        assert_eq!(server.port.as_ref().and_then(|p| p.number), Some(443));
        assert!(server.extra.contains_key("tls"));
    }
}
