/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of httpbatch, a client-side HTTP request batcher.
 *
 * httpbatch is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * httpbatch is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with httpbatch.  If not, see <http://www.gnu.org/licenses/>.
 */

//! MIME pieces of the batch wire format: Content-Type parsing and multipart batch framing.

mod content_type;
pub mod multipart;

pub use content_type::{is_json, is_token, parse_content_type, parse_parameter_list, ContentType};
pub use multipart::{convert_body, decode_batch, encode_batch, find_response_boundary, ResponsePart};
