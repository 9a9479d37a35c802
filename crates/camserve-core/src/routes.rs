//! Static HTTP route table and the index page.

/// Path of the snapshot endpoint.
pub const CAPTURE_PATH: &str = "/capture";

/// Path of the landing page.
pub const INDEX_PATH: &str = "/";

pub const CONTENT_TYPE_HTML: &str = "text/html";
pub const CONTENT_TYPE_JPEG: &str = "image/jpeg";

/// Landing page: shows the latest snapshot and a button to take another.
pub const INDEX_HTML: &str = concat!(
    "<html>",
    "<head><title>ESP32-CAM Capture</title></head>",
    "<body>",
    "<h1>ESP32-CAM Photo</h1>",
    "<img src=\"/capture\" width=\"640\" height=\"480\">",
    "<br><br>",
    "<button onclick=\"window.location.reload()\">Take New Photo</button>",
    "</body>",
    "</html>",
);

/// HTTP methods used by the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
}

/// Which handler serves a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Index,
    Capture,
}

/// One entry of the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub path: &'static str,
    pub method: Method,
    pub kind: RouteKind,
}

/// Every route the server registers, in registration order.
pub const ROUTES: [Route; 2] = [
    Route {
        path: INDEX_PATH,
        method: Method::Get,
        kind: RouteKind::Index,
    },
    Route {
        path: CAPTURE_PATH,
        method: Method::Get,
        kind: RouteKind::Capture,
    },
];

/// Look up the route for a request.
pub fn resolve(method: Method, path: &str) -> Option<&'static Route> {
    ROUTES
        .iter()
        .find(|route| route.method == method && route.path == path)
}

/// Response for the index route: content type and body.
pub fn index_page() -> (&'static str, &'static str) {
    (CONTENT_TYPE_HTML, INDEX_HTML)
}
